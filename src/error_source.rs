//! Error-source tables
//!
//! One row per additive error contribution, enabled per sensor. Raw rows are
//! parsed and validated once here; the sampler trusts the result.

use serde::{Deserialize, Serialize};

use crate::model::{parse_flag, parse_number};
use crate::EdmfError;

/// Number of metadata columns ahead of the per-sensor flags: low, high, kind.
pub const METADATA_COLUMNS: usize = 3;

/// Distribution family of an error source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Uniform on `[low, high]` scaled by `|reference|`.
    Relative,
    /// Uniform on `[low, high]`.
    Absolute,
    /// Normal with mean `low` and standard deviation `high`.
    Gaussian,
}

impl ErrorKind {
    /// `r` is relative, `a` is absolute, anything else is gaussian.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "r" => ErrorKind::Relative,
            "a" => ErrorKind::Absolute,
            _ => ErrorKind::Gaussian,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Relative => "r",
            ErrorKind::Absolute => "a",
            ErrorKind::Gaussian => "g",
        }
    }
}

/// One additive error contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    /// Lower bound, or the mean for [`ErrorKind::Gaussian`]
    pub low: f64,
    /// Upper bound, or the standard deviation for [`ErrorKind::Gaussian`]
    pub high: f64,
    pub kind: ErrorKind,
    /// Per-sensor inclusion flags
    pub enabled: Vec<bool>,
}

impl ErrorSource {
    pub fn new(low: f64, high: f64, kind: ErrorKind, enabled: Vec<bool>) -> Self {
        Self {
            low,
            high,
            kind,
            enabled,
        }
    }

    pub fn is_enabled(&self, sensor: usize) -> bool {
        self.enabled.get(sensor).copied().unwrap_or(false)
    }

    fn validate(&self, row: usize) -> Result<(), EdmfError> {
        let invalid = |reason: &str| EdmfError::InvalidErrorSource {
            row,
            reason: reason.to_string(),
        };

        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(invalid("bounds must be finite"));
        }

        match self.kind {
            ErrorKind::Relative | ErrorKind::Absolute if self.low > self.high => {
                Err(invalid("low must not exceed high"))
            }
            ErrorKind::Gaussian if self.high < 0.0 => {
                Err(invalid("standard deviation must be >= 0"))
            }
            _ => Ok(()),
        }
    }
}

/// Validated error sources for one case (measurement or prediction).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSourceTable {
    num_sensors: usize,
    sources: Vec<ErrorSource>,
}

impl ErrorSourceTable {
    /// Builds a table from typed rows, checking every flag row is
    /// `num_sensors` wide and every bound is usable.
    pub fn new(num_sensors: usize, sources: Vec<ErrorSource>) -> Result<Self, EdmfError> {
        for (row, source) in sources.iter().enumerate() {
            if source.enabled.len() != num_sensors {
                return Err(EdmfError::ColumnCount {
                    row,
                    expected: num_sensors + METADATA_COLUMNS,
                    got: source.enabled.len() + METADATA_COLUMNS,
                });
            }
            source.validate(row)?;
        }

        Ok(Self {
            num_sensors,
            sources,
        })
    }

    /// Parses raw cells laid out as `[low, high, kind, flag_1 .. flag_n]`.
    pub fn from_rows<S: AsRef<str>>(
        num_sensors: usize,
        rows: &[Vec<S>],
    ) -> Result<Self, EdmfError> {
        let expected = num_sensors + METADATA_COLUMNS;
        let mut sources = Vec::with_capacity(rows.len());

        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != expected {
                return Err(EdmfError::ColumnCount {
                    row,
                    expected,
                    got: cells.len(),
                });
            }

            let low = parse_number("error-source low", cells[0].as_ref())?;
            let high = parse_number("error-source high", cells[1].as_ref())?;
            let kind = ErrorKind::from_code(cells[2].as_ref());
            let enabled = cells[METADATA_COLUMNS..]
                .iter()
                .map(|cell| parse_flag("error-source flag", cell.as_ref()))
                .collect::<Result<Vec<_>, _>>()?;

            sources.push(ErrorSource::new(low, high, kind, enabled));
        }

        Self::new(num_sensors, sources)
    }

    pub fn num_sensors(&self) -> usize {
        self.num_sensors
    }

    pub fn sources(&self) -> &[ErrorSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources enabled for `sensor`, in row order.
    pub fn enabled_for(&self, sensor: usize) -> impl Iterator<Item = &ErrorSource> + '_ {
        self.sources.iter().filter(move |s| s.is_enabled(sensor))
    }
}
