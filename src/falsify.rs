//! Candidate model selection
//!
//! A model instance survives when, on every active sensor, its residual
//! `prediction - measurement` lies inside `[T_low, T_high]`.

use serde::Serialize;

use crate::model::ActiveSensorMask;
use crate::threshold::Thresholds;
use crate::{ensure_len, EdmfError};

/// Suspicious but legitimate outcomes, reported instead of raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainWarning {
    /// No sensor is active, so nothing can be falsified.
    NoActiveSensors,
    /// Every model instance was falsified.
    EmptyCandidateSet,
    /// `T_low > T_high` on an active sensor.
    DegenerateThreshold { sensor: usize },
}

impl std::fmt::Display for DomainWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainWarning::NoActiveSensors => {
                write!(f, "no active sensors: every model instance is retained")
            }
            DomainWarning::EmptyCandidateSet => {
                write!(f, "every model instance was falsified")
            }
            DomainWarning::DegenerateThreshold { sensor } => {
                write!(f, "sensor {sensor} has T_low > T_high and rejects every instance")
            }
        }
    }
}

/// Result of one falsification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FalsificationOutcome {
    /// 1-based IDs of surviving instances, ascending
    pub candidates: Vec<usize>,
    pub warnings: Vec<DomainWarning>,
}

impl FalsificationOutcome {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// 0-based row indices of the survivors.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.candidates.iter().map(|id| id - 1)
    }
}

/// Filters `predictions` (`size_IMS x num_sensors`) against `thresholds`
/// over the sensors flagged in `active`.
pub fn falsify(
    predictions: &[Vec<f64>],
    measurements: &[f64],
    thresholds: &Thresholds,
    active: &ActiveSensorMask,
) -> Result<FalsificationOutcome, EdmfError> {
    let num_sensors = measurements.len();
    ensure_len("threshold pairs", num_sensors, thresholds.len())?;
    ensure_len("active-sensor mask", num_sensors, active.len())?;
    for row in predictions {
        ensure_len("prediction row", num_sensors, row.len())?;
    }

    let active_sensors = active.active_indices();
    let mut warnings = Vec::new();
    if active_sensors.is_empty() {
        warnings.push(DomainWarning::NoActiveSensors);
    }
    for &j in &active_sensors {
        if thresholds.pairs()[j].is_degenerate() {
            warnings.push(DomainWarning::DegenerateThreshold { sensor: j });
        }
    }

    let candidates: Vec<usize> = predictions
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            active_sensors
                .iter()
                .all(|&j| thresholds.pairs()[j].contains(row[j] - measurements[j]))
        })
        .map(|(s, _)| s + 1)
        .collect();

    if candidates.is_empty() {
        warnings.push(DomainWarning::EmptyCandidateSet);
    }
    for warning in &warnings {
        log::warn!("{warning}");
    }
    log::debug!(
        "{} of {} model instances retained over {} active sensors",
        candidates.len(),
        predictions.len(),
        active_sensors.len()
    );

    Ok(FalsificationOutcome {
        candidates,
        warnings,
    })
}
