//! Run summary and the candidate model table handed to result writers

use serde::Serialize;

use crate::falsify::{DomainWarning, FalsificationOutcome};
use crate::model::{ActiveSensorMask, ModelSet};
use crate::threshold::{ThresholdPair, Thresholds};
use crate::EdmfError;

/// Structured account of a falsification run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub num_parameters: usize,
    pub num_sensors: usize,
    pub size_ims: usize,
    pub parameter_names: Vec<String>,
    pub sensor_names: Vec<String>,
    pub active_sensors: Vec<String>,
    pub n_samples: usize,
    pub measurement_seed: u64,
    pub prediction_seed: u64,
    pub cutoff: f64,
    pub effective_cutoff: f64,
    pub sidak: bool,
    pub thresholds: Vec<ThresholdPair>,
    pub size_cms: usize,
    pub warnings: Vec<DomainWarning>,
}

/// Inputs to [`RunSummary::new`] that are not part of the model set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingRecord {
    pub n_samples: usize,
    pub measurement_seed: u64,
    pub prediction_seed: u64,
}

impl RunSummary {
    pub fn new(
        models: &ModelSet,
        active: &ActiveSensorMask,
        sampling: SamplingRecord,
        thresholds: &Thresholds,
        outcome: &FalsificationOutcome,
    ) -> Self {
        let sensor_names = models.sensor_names();
        Self {
            num_parameters: models.num_parameters(),
            num_sensors: models.num_sensors(),
            size_ims: models.size(),
            parameter_names: models.parameter_names().to_vec(),
            sensor_names: sensor_names.to_vec(),
            active_sensors: active
                .active_indices()
                .into_iter()
                .map(|j| sensor_names[j].clone())
                .collect(),
            n_samples: sampling.n_samples,
            measurement_seed: sampling.measurement_seed,
            prediction_seed: sampling.prediction_seed,
            cutoff: thresholds.requested_cutoff(),
            effective_cutoff: thresholds.effective_cutoff(),
            sidak: thresholds.sidak(),
            thresholds: thresholds.pairs().to_vec(),
            size_cms: outcome.len(),
            warnings: outcome.warnings.clone(),
        }
    }
}

/// One surviving instance, copied verbatim from the input.
#[derive(Debug, Clone, PartialEq)]
pub struct CmsRow {
    /// 1-based instance ID
    pub id: usize,
    pub parameters: Vec<f64>,
    pub predictions: Vec<f64>,
}

/// Candidate model set laid out as `[ID, <parameters>, <sensors>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CmsTable {
    pub parameter_names: Vec<String>,
    pub sensor_names: Vec<String>,
    pub rows: Vec<CmsRow>,
}

impl CmsTable {
    pub fn new(models: &ModelSet, candidates: &[usize]) -> Result<Self, EdmfError> {
        let rows = candidates
            .iter()
            .map(|&id| {
                if id == 0 || id > models.size() {
                    return Err(EdmfError::InvalidValue {
                        context: format!("candidate ID (IMS has {} instances)", models.size()),
                        value: id.to_string(),
                    });
                }
                Ok(CmsRow {
                    id,
                    parameters: models.parameters()[id - 1].clone(),
                    predictions: models.predictions()[id - 1].clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            parameter_names: models.parameter_names().to_vec(),
            sensor_names: models.sensor_names().to_vec(),
            rows,
        })
    }

    pub fn header(&self) -> Vec<String> {
        std::iter::once("ID".to_string())
            .chain(self.parameter_names.iter().cloned())
            .chain(self.sensor_names.iter().cloned())
            .collect()
    }

    pub fn ids(&self) -> Vec<usize> {
        self.rows.iter().map(|row| row.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> ModelSet {
        ModelSet::from_table(
            1,
            vec!["E".into(), "s1".into(), "s2".into()],
            vec![
                vec![10.0, 1.0, 1.0],
                vec![20.0, 5.0, 5.0],
                vec![30.0, 10.0, 10.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn table_copies_rows_for_candidates() {
        let table = CmsTable::new(&models(), &[1, 3]).unwrap();
        assert_eq!(table.header(), vec!["ID", "E", "s1", "s2"]);
        assert_eq!(table.ids(), vec![1, 3]);
        assert_eq!(table.rows[1].parameters, vec![30.0]);
        assert_eq!(table.rows[1].predictions, vec![10.0, 10.0]);
    }

    #[test]
    fn table_rejects_unknown_ids() {
        assert!(CmsTable::new(&models(), &[0]).is_err());
        assert!(CmsTable::new(&models(), &[4]).is_err());
    }

    #[test]
    fn summary_lists_active_sensor_names() {
        let models = models();
        let active = ActiveSensorMask::new(vec![false, true]);
        let thresholds = Thresholds::from_pairs(vec![
            ThresholdPair::new(-1.0, 1.0),
            ThresholdPair::new(-1.0, 1.0),
        ]);
        let outcome = FalsificationOutcome {
            candidates: vec![1],
            warnings: Vec::new(),
        };
        let summary = RunSummary::new(
            &models,
            &active,
            SamplingRecord {
                n_samples: 100,
                measurement_seed: 1,
                prediction_seed: 2,
            },
            &thresholds,
            &outcome,
        );

        assert_eq!(summary.active_sensors, vec!["s2".to_string()]);
        assert_eq!(summary.size_ims, 3);
        assert_eq!(summary.size_cms, 1);
        assert_eq!(summary.num_parameters, 1);
    }
}
