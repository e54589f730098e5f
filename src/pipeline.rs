//! Staged falsification run
//!
//! `Pipeline<Uninitialized> -> Pipeline<Sampled> -> Pipeline<Thresholded>
//! -> Pipeline<Falsified>`. Each transition consumes the previous stage, so
//! stages cannot be skipped or repeated out of order.

use crate::config::EdmfConfig;
use crate::error_source::ErrorSourceTable;
use crate::falsify::{falsify, FalsificationOutcome};
use crate::model::{ActiveSensorMask, Measurements, ModelSet};
use crate::report::{CmsTable, RunSummary, SamplingRecord};
use crate::sampler::{Case, MonteCarloSampler, SampleDistributions};
use crate::threshold::{compute_bounds, ThresholdConfig, Thresholds};
use crate::{ensure_len, EdmfError};

/// Immutable, already-loaded tables for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct EdmfInputs {
    pub models: ModelSet,
    pub measurements: Measurements,
    pub measurement_errors: ErrorSourceTable,
    pub prediction_errors: ErrorSourceTable,
    pub active: ActiveSensorMask,
}

impl EdmfInputs {
    /// Checks that every table agrees on the number of sensors.
    pub fn validate(&self) -> Result<(), EdmfError> {
        let n = self.models.num_sensors();
        ensure_len("measurement vector", n, self.measurements.len())?;
        ensure_len(
            "measurement error-source sensors",
            n,
            self.measurement_errors.num_sensors(),
        )?;
        ensure_len(
            "prediction error-source sensors",
            n,
            self.prediction_errors.num_sensors(),
        )?;
        ensure_len("active-sensor mask", n, self.active.len())?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Uninitialized;

#[derive(Debug)]
pub struct Sampled {
    measurement: SampleDistributions,
    prediction: SampleDistributions,
}

#[derive(Debug)]
pub struct Thresholded {
    sampling: SamplingRecord,
    thresholds: Thresholds,
}

#[derive(Debug)]
pub struct Falsified {
    sampling: SamplingRecord,
    thresholds: Thresholds,
    outcome: FalsificationOutcome,
}

#[derive(Debug)]
pub struct Pipeline<S> {
    inputs: EdmfInputs,
    state: S,
}

impl<S> Pipeline<S> {
    pub fn inputs(&self) -> &EdmfInputs {
        &self.inputs
    }
}

impl Pipeline<Uninitialized> {
    pub fn new(inputs: EdmfInputs) -> Result<Self, EdmfError> {
        inputs.validate()?;
        log::debug!(
            "EDMF run: {} instances, {} parameters, {} sensors ({} active)",
            inputs.models.size(),
            inputs.models.num_parameters(),
            inputs.models.num_sensors(),
            inputs.active.count()
        );
        Ok(Self {
            inputs,
            state: Uninitialized,
        })
    }

    /// Checks `config` against these inputs before any sampling work.
    pub fn check_thresholds(&self, config: &ThresholdConfig) -> Result<(), EdmfError> {
        config.validate_active(self.inputs.active.count())
    }

    /// Draws the measurement and prediction error distributions.
    pub fn sample(self, sampler: &MonteCarloSampler) -> Result<Pipeline<Sampled>, EdmfError> {
        let measurement = sampler.sample(
            Case::Measurement,
            &self.inputs.measurement_errors,
            self.inputs.measurements.values(),
        )?;
        let prediction = sampler.sample(
            Case::Prediction,
            &self.inputs.prediction_errors,
            &self.inputs.models.prediction_means(),
        )?;

        Ok(Pipeline {
            inputs: self.inputs,
            state: Sampled {
                measurement,
                prediction,
            },
        })
    }
}

impl Pipeline<Sampled> {
    pub fn measurement_distributions(&self) -> &SampleDistributions {
        &self.state.measurement
    }

    pub fn prediction_distributions(&self) -> &SampleDistributions {
        &self.state.prediction
    }

    /// Derives the per-sensor bounds; the distributions are dropped here.
    pub fn compute_thresholds(
        self,
        config: &ThresholdConfig,
    ) -> Result<Pipeline<Thresholded>, EdmfError> {
        let Sampled {
            measurement,
            prediction,
        } = self.state;
        let thresholds = compute_bounds(
            &measurement,
            &prediction,
            config,
            self.inputs.active.count(),
        )?;

        Ok(Pipeline {
            inputs: self.inputs,
            state: Thresholded {
                sampling: SamplingRecord {
                    n_samples: measurement.n_samples(),
                    measurement_seed: measurement.seed(),
                    prediction_seed: prediction.seed(),
                },
                thresholds,
            },
        })
    }
}

impl Pipeline<Thresholded> {
    pub fn thresholds(&self) -> &Thresholds {
        &self.state.thresholds
    }

    pub fn falsify(self) -> Result<Pipeline<Falsified>, EdmfError> {
        let outcome = falsify(
            self.inputs.models.predictions(),
            self.inputs.measurements.values(),
            &self.state.thresholds,
            &self.inputs.active,
        )?;

        Ok(Pipeline {
            inputs: self.inputs,
            state: Falsified {
                sampling: self.state.sampling,
                thresholds: self.state.thresholds,
                outcome,
            },
        })
    }
}

impl Pipeline<Falsified> {
    pub fn thresholds(&self) -> &Thresholds {
        &self.state.thresholds
    }

    pub fn outcome(&self) -> &FalsificationOutcome {
        &self.state.outcome
    }

    /// 1-based IDs of the candidate model set.
    pub fn candidates(&self) -> &[usize] {
        &self.state.outcome.candidates
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::new(
            &self.inputs.models,
            &self.inputs.active,
            self.state.sampling,
            &self.state.thresholds,
            &self.state.outcome,
        )
    }

    pub fn cms_table(&self) -> Result<CmsTable, EdmfError> {
        CmsTable::new(&self.inputs.models, &self.state.outcome.candidates)
    }
}

/// Runs every stage with `config`.
pub fn run(inputs: EdmfInputs, config: &EdmfConfig) -> Result<Pipeline<Falsified>, EdmfError> {
    config.validate()?;
    let sampler = config.sampler()?;
    let threshold_config = config.thresholds();
    let pipeline = Pipeline::new(inputs)?;
    pipeline.check_thresholds(&threshold_config)?;

    pipeline
        .sample(&sampler)?
        .compute_thresholds(&threshold_config)?
        .falsify()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_source::{ErrorKind, ErrorSource};

    fn inputs(active: Vec<bool>) -> EdmfInputs {
        let models = ModelSet::from_table(
            1,
            vec!["p".into(), "s1".into(), "s2".into()],
            vec![
                vec![0.1, 1.0, 1.0],
                vec![0.2, 5.0, 5.0],
                vec![0.3, 10.0, 10.0],
            ],
        )
        .unwrap();
        let errors = |half: f64| {
            ErrorSourceTable::new(
                2,
                vec![ErrorSource::new(-half, half, ErrorKind::Absolute, vec![true, true])],
            )
            .unwrap()
        };

        EdmfInputs {
            models,
            measurements: Measurements::new(vec![1.0, 1.0]).unwrap(),
            measurement_errors: errors(0.25),
            prediction_errors: errors(0.25),
            active: ActiveSensorMask::new(active),
        }
    }

    fn config() -> EdmfConfig {
        EdmfConfig {
            n_samples: 20_000,
            seed: Some(2018),
            ..EdmfConfig::default()
        }
    }

    #[test]
    fn full_run_keeps_the_matching_instance() {
        let done = run(inputs(vec![true, true]), &config()).unwrap();
        assert_eq!(done.candidates(), &[1]);

        let t = done.thresholds().pairs()[0];
        // difference of two U(-0.25, 0.25) is within [-0.5, 0.5]
        assert!(t.low > -0.5 && t.low < 0.0);
        assert!(t.high < 0.5 && t.high > 0.0);
    }

    #[test]
    fn stages_expose_intermediate_values() {
        let sampled = Pipeline::new(inputs(vec![true, false]))
            .unwrap()
            .sample(&config().sampler().unwrap())
            .unwrap();
        assert_eq!(sampled.measurement_distributions().n_samples(), 20_000);
        assert_eq!(sampled.prediction_distributions().num_sensors(), 2);

        let thresholded = sampled.compute_thresholds(&config().thresholds()).unwrap();
        // one active sensor: Sidak is a no-op
        assert_eq!(thresholded.thresholds().effective_cutoff(), 95.0);

        let done = thresholded.falsify().unwrap();
        let summary = done.summary();
        assert_eq!(summary.active_sensors, vec!["s1".to_string()]);
        assert_eq!(summary.measurement_seed, 2018);
        assert_eq!(summary.size_cms, 1);
        assert_eq!(done.cms_table().unwrap().ids(), vec![1]);
    }

    #[test]
    fn rejects_mismatched_tables() {
        let mut bad = inputs(vec![true, true]);
        bad.measurements = Measurements::new(vec![1.0]).unwrap();
        assert!(matches!(
            Pipeline::new(bad),
            Err(EdmfError::LengthMismatch { .. })
        ));

        assert!(Pipeline::new(inputs(vec![true])).is_err());
    }

    #[test]
    fn sidak_with_no_active_sensors_is_rejected() {
        assert_eq!(
            run(inputs(vec![false, false]), &config()).unwrap_err(),
            EdmfError::NoActiveSensors
        );

        // detected on the unsampled pipeline
        let pipeline = Pipeline::new(inputs(vec![false, false])).unwrap();
        assert_eq!(
            pipeline.check_thresholds(&config().thresholds()),
            Err(EdmfError::NoActiveSensors)
        );
        let no_sidak = ThresholdConfig {
            sidak: false,
            ..config().thresholds()
        };
        assert!(pipeline.check_thresholds(&no_sidak).is_ok());
    }

    #[test]
    fn no_active_sensors_without_sidak_keeps_everything() {
        let config = EdmfConfig {
            sidak: false,
            ..config()
        };
        let done = run(inputs(vec![false, false]), &config).unwrap();
        assert_eq!(done.candidates(), &[1, 2, 3]);
        assert_eq!(
            done.outcome().warnings,
            vec![crate::falsify::DomainWarning::NoActiveSensors]
        );
    }

    #[test]
    fn seeded_runs_are_identical() {
        let a = run(inputs(vec![true, true]), &config()).unwrap();
        let b = run(inputs(vec![true, true]), &config()).unwrap();
        assert_eq!(a.thresholds(), b.thresholds());
        assert_eq!(a.candidates(), b.candidates());
    }
}
