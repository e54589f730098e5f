use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

use crate::sampler::{MonteCarloSampler, DEFAULT_SAMPLES, MIN_SAMPLES};
use crate::threshold::{ThresholdConfig, DEFAULT_CUTOFF};
use crate::EdmfError;

/// Settings for one falsification run.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdmfConfig {
    /// Monte Carlo draws per sensor and case
    #[serde_as(as = "DefaultOnNull")]
    pub n_samples: usize,
    /// Base seed; `None` draws a fresh one per sampling call
    pub seed: Option<u64>,
    /// Joint confidence level in percent
    #[serde_as(as = "DefaultOnNull")]
    pub cutoff: f64,
    #[serde_as(as = "DefaultOnNull")]
    pub sidak: bool,
}

impl Default for EdmfConfig {
    fn default() -> Self {
        Self {
            n_samples: DEFAULT_SAMPLES,
            seed: None,
            cutoff: DEFAULT_CUTOFF,
            sidak: true,
        }
    }
}

impl EdmfConfig {
    pub fn validate(&self) -> Result<(), EdmfError> {
        if self.n_samples < MIN_SAMPLES {
            return Err(EdmfError::InvalidConfig(format!(
                "n_samples must be at least {MIN_SAMPLES}"
            )));
        }

        self.thresholds().validate()
    }

    pub fn sampler(&self) -> Result<MonteCarloSampler, EdmfError> {
        let sampler = MonteCarloSampler::new(self.n_samples)?;
        Ok(match self.seed {
            Some(seed) => sampler.with_seed(seed),
            None => sampler,
        })
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        ThresholdConfig {
            cutoff: self.cutoff,
            sidak: self.sidak,
        }
    }
}
