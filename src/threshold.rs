//! Per-sensor falsification thresholds
//!
//! `T_low`/`T_high` are the central `cutoff` percent band of
//! `meas_sample - pred_sample`, optionally widened by the Sidak correction
//! for the number of simultaneously tested sensors.

use serde::{Deserialize, Serialize};

use crate::sampler::{SampleDistributions, MIN_SAMPLES};
use crate::{ensure_len, EdmfError};

/// Default joint confidence level, in percent.
pub const DEFAULT_CUTOFF: f64 = 95.0;

/// Requested confidence level and whether to correct it for multiple
/// comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Joint confidence level in percent, `0 < cutoff < 100`
    pub cutoff: f64,
    /// Apply the Sidak correction over the active sensors
    pub sidak: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_CUTOFF,
            sidak: true,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), EdmfError> {
        if !(self.cutoff > 0.0 && self.cutoff < 100.0) {
            return Err(EdmfError::CutoffOutOfRange(self.cutoff));
        }
        Ok(())
    }

    /// Rejects a Sidak-corrected run over zero active sensors.
    pub fn validate_active(&self, n_active_sensors: usize) -> Result<(), EdmfError> {
        self.validate()?;
        if self.sidak && n_active_sensors == 0 {
            return Err(EdmfError::NoActiveSensors);
        }
        Ok(())
    }
}

/// Acceptance band for one sensor's residual `prediction - measurement`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub low: f64,
    pub high: f64,
}

impl ThresholdPair {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, residual: f64) -> bool {
        self.low <= residual && residual <= self.high
    }

    /// `low > high`: nothing can pass this sensor.
    pub fn is_degenerate(&self) -> bool {
        self.low > self.high
    }
}

/// Threshold bands for every sensor plus the cutoff they were cut at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pairs: Vec<ThresholdPair>,
    requested_cutoff: f64,
    effective_cutoff: f64,
    sidak: bool,
}

impl Thresholds {
    /// Thresholds given directly rather than derived from distributions.
    pub fn from_pairs(pairs: Vec<ThresholdPair>) -> Self {
        Self {
            pairs,
            requested_cutoff: f64::NAN,
            effective_cutoff: f64::NAN,
            sidak: false,
        }
    }

    pub fn pairs(&self) -> &[ThresholdPair] {
        &self.pairs
    }

    pub fn get(&self, sensor: usize) -> Option<&ThresholdPair> {
        self.pairs.get(sensor)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn requested_cutoff(&self) -> f64 {
        self.requested_cutoff
    }

    /// Per-sensor level actually used, after any Sidak correction.
    pub fn effective_cutoff(&self) -> f64 {
        self.effective_cutoff
    }

    pub fn sidak(&self) -> bool {
        self.sidak
    }
}

/// Sidak-corrected per-comparison level: `100 * (cutoff/100)^(1/n)`.
pub fn sidak_cutoff(cutoff: f64, n_active_sensors: usize) -> Result<f64, EdmfError> {
    if n_active_sensors == 0 {
        return Err(EdmfError::NoActiveSensors);
    }
    Ok(100.0 * (cutoff / 100.0).powf(1.0 / n_active_sensors as f64))
}

/// Percentile `p` (0..=100) of ascending `sorted`, linearly interpolated
/// between the two closest order statistics.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Cuts `T_low`/`T_high` per sensor from the positional difference of the
/// measurement and prediction distributions.
pub fn compute_bounds(
    meas: &SampleDistributions,
    pred: &SampleDistributions,
    config: &ThresholdConfig,
    n_active_sensors: usize,
) -> Result<Thresholds, EdmfError> {
    config.validate()?;
    ensure_len("prediction distributions", meas.num_sensors(), pred.num_sensors())?;
    ensure_len("prediction samples", meas.n_samples(), pred.n_samples())?;
    if meas.n_samples() < MIN_SAMPLES {
        return Err(EdmfError::TooFewSamples {
            min: MIN_SAMPLES,
            got: meas.n_samples(),
        });
    }

    let cutoff = if config.sidak {
        sidak_cutoff(config.cutoff, n_active_sensors)?
    } else {
        config.cutoff
    };
    let p_low = (100.0 - cutoff) / 2.0;
    let p_high = (100.0 + cutoff) / 2.0;
    log::debug!(
        "threshold percentiles {:.6}/{:.6} (cutoff {} -> {:.6}, sidak {})",
        p_low,
        p_high,
        config.cutoff,
        cutoff,
        config.sidak
    );

    let pairs = meas
        .rows()
        .iter()
        .zip(pred.rows())
        .map(|(m, p)| {
            let mut delta: Vec<f64> = m.iter().zip(p).map(|(a, b)| a - b).collect();
            delta.sort_unstable_by(f64::total_cmp);
            ThresholdPair::new(percentile(&delta, p_low), percentile(&delta, p_high))
        })
        .collect();

    Ok(Thresholds {
        pairs,
        requested_cutoff: config.cutoff,
        effective_cutoff: cutoff,
        sidak: config.sidak,
    })
}
