//! Initial model set, measurements and the active-sensor mask

use crate::{ensure_len, EdmfError};

/// Candidate model instances: one parameter vector and one prediction vector
/// per row.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSet {
    parameter_names: Vec<String>,
    sensor_names: Vec<String>,
    parameters: Vec<Vec<f64>>,
    predictions: Vec<Vec<f64>>,
}

impl ModelSet {
    pub fn new(
        parameter_names: Vec<String>,
        sensor_names: Vec<String>,
        parameters: Vec<Vec<f64>>,
        predictions: Vec<Vec<f64>>,
    ) -> Result<Self, EdmfError> {
        if sensor_names.is_empty() {
            return Err(EdmfError::Empty("sensor list"));
        }
        if predictions.is_empty() {
            return Err(EdmfError::Empty("initial model set"));
        }
        ensure_len("parameter rows", predictions.len(), parameters.len())?;

        for row in &parameters {
            ensure_len("parameter row", parameter_names.len(), row.len())?;
        }
        for row in &predictions {
            ensure_len("prediction row", sensor_names.len(), row.len())?;
        }
        ensure_finite("parameter values", &parameters)?;
        ensure_finite("prediction values", &predictions)?;

        Ok(Self {
            parameter_names,
            sensor_names,
            parameters,
            predictions,
        })
    }

    /// Splits a combined table whose first `num_parameters` columns are
    /// parameters and whose remaining columns are sensor predictions.
    pub fn from_table(
        num_parameters: usize,
        header: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, EdmfError> {
        if num_parameters > header.len() {
            return Err(EdmfError::InvalidConfig(format!(
                "{num_parameters} parameter columns requested but the table has {}",
                header.len()
            )));
        }

        let mut parameters = Vec::with_capacity(rows.len());
        let mut predictions = Vec::with_capacity(rows.len());
        for mut row in rows {
            ensure_len("model set row", header.len(), row.len())?;
            let sensors = row.split_off(num_parameters);
            parameters.push(row);
            predictions.push(sensors);
        }

        let mut parameter_names = header;
        let sensor_names = parameter_names.split_off(num_parameters);
        Self::new(parameter_names, sensor_names, parameters, predictions)
    }

    pub fn num_parameters(&self) -> usize {
        self.parameter_names.len()
    }

    pub fn num_sensors(&self) -> usize {
        self.sensor_names.len()
    }

    /// Number of model instances in the IMS.
    pub fn size(&self) -> usize {
        self.predictions.len()
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn sensor_names(&self) -> &[String] {
        &self.sensor_names
    }

    pub fn parameters(&self) -> &[Vec<f64>] {
        &self.parameters
    }

    pub fn predictions(&self) -> &[Vec<f64>] {
        &self.predictions
    }

    /// Column-wise mean of the predictions, the reference for relative
    /// prediction errors.
    pub fn prediction_means(&self) -> Vec<f64> {
        let n = self.size() as f64;
        let mut sums = vec![0.0; self.num_sensors()];
        for row in &self.predictions {
            for (sum, value) in sums.iter_mut().zip(row) {
                *sum += value;
            }
        }
        sums.into_iter().map(|s| s / n).collect()
    }
}

/// One measured value per sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurements {
    values: Vec<f64>,
}

impl Measurements {
    pub fn new(values: Vec<f64>) -> Result<Self, EdmfError> {
        if values.is_empty() {
            return Err(EdmfError::Empty("measurement vector"));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(EdmfError::InvalidValue {
                context: "measurement vector".to_string(),
                value: bad.to_string(),
            });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Sensors taking part in the falsification test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSensorMask {
    flags: Vec<bool>,
}

impl ActiveSensorMask {
    pub fn new(flags: Vec<bool>) -> Self {
        Self { flags }
    }

    pub fn all(num_sensors: usize) -> Self {
        Self {
            flags: vec![true; num_sensors],
        }
    }

    /// Parses one `0`/`1` cell per sensor.
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Result<Self, EdmfError> {
        let flags = cells
            .iter()
            .map(|cell| parse_flag("active-sensor flag", cell.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { flags })
    }

    pub fn is_active(&self, sensor: usize) -> bool {
        self.flags.get(sensor).copied().unwrap_or(false)
    }

    pub fn active_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(|(j, _)| j)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&active| active).count()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }
}

fn ensure_finite(context: &str, rows: &[Vec<f64>]) -> Result<(), EdmfError> {
    match rows.iter().flatten().find(|v| !v.is_finite()) {
        Some(bad) => Err(EdmfError::InvalidValue {
            context: context.to_string(),
            value: bad.to_string(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn parse_number(context: &str, cell: &str) -> Result<f64, EdmfError> {
    cell.trim()
        .parse::<f64>()
        .map_err(|_| EdmfError::InvalidValue {
            context: context.to_string(),
            value: cell.to_string(),
        })
}

/// Accepts `0` and `1` in any numeric spelling (`1`, `1.0`, ...).
pub(crate) fn parse_flag(context: &str, cell: &str) -> Result<bool, EdmfError> {
    match parse_number(context, cell)? {
        v if v == 1.0 => Ok(true),
        v if v == 0.0 => Ok(false),
        _ => Err(EdmfError::InvalidValue {
            context: context.to_string(),
            value: cell.to_string(),
        }),
    }
}
