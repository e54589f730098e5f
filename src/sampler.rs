//! Monte Carlo synthesis of combined per-sensor error distributions
//!
//! Every sensor draws from its own ChaCha stream, keyed by the run seed, the
//! case and the sensor index. Sensors are therefore independent of each
//! other and of evaluation order, and the `parallel` feature yields the same
//! numbers as the serial path.

use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error_source::{ErrorKind, ErrorSource, ErrorSourceTable};
use crate::{ensure_len, EdmfError};

/// Default number of Monte Carlo draws per sensor.
pub const DEFAULT_SAMPLES: usize = 1_000_000;

/// Smallest sample count for which the percentile interpolation is defined.
pub const MIN_SAMPLES: usize = 2;

/// Which side of the residual a distribution describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Case {
    Measurement,
    Prediction,
}

impl Case {
    fn stream_tag(self) -> u64 {
        match self {
            Case::Measurement => 0,
            Case::Prediction => 1,
        }
    }
}

/// One combined error distribution per sensor, `num_sensors x n_samples`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleDistributions {
    case: Case,
    seed: u64,
    samples: Vec<Vec<f64>>,
}

impl SampleDistributions {
    /// Wraps precomputed distributions. Every row must hold the same number
    /// of samples.
    pub fn from_rows(case: Case, seed: u64, samples: Vec<Vec<f64>>) -> Result<Self, EdmfError> {
        if let Some(first) = samples.first() {
            for row in &samples {
                ensure_len("distribution samples", first.len(), row.len())?;
            }
        }
        Ok(Self {
            case,
            seed,
            samples,
        })
    }

    pub fn case(&self) -> Case {
        self.case
    }

    /// Base seed the distributions were drawn with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_sensors(&self) -> usize {
        self.samples.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    /// Samples for one sensor, `None` when out of range.
    pub fn sensor(&self, sensor: usize) -> Option<&[f64]> {
        self.samples.get(sensor).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.samples
    }
}

/// Draws combined error distributions from an [`ErrorSourceTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloSampler {
    n_samples: usize,
    seed: Option<u64>,
}

impl MonteCarloSampler {
    /// Unseeded sampler: each call to [`sample`](Self::sample) picks a fresh
    /// base seed.
    pub fn new(n_samples: usize) -> Result<Self, EdmfError> {
        if n_samples < MIN_SAMPLES {
            return Err(EdmfError::TooFewSamples {
                min: MIN_SAMPLES,
                got: n_samples,
            });
        }
        Ok(Self {
            n_samples,
            seed: None,
        })
    }

    /// Fixes the base seed so repeated calls are bit-identical.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Sums independent draws from every enabled source, per sensor.
    ///
    /// `reference` scales relative sources: the raw measurements for
    /// [`Case::Measurement`], the prediction means for [`Case::Prediction`].
    pub fn sample(
        &self,
        case: Case,
        sources: &ErrorSourceTable,
        reference: &[f64],
    ) -> Result<SampleDistributions, EdmfError> {
        ensure_len("reference vector", sources.num_sensors(), reference.len())?;

        let seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        log::debug!(
            "sampling {:?} errors: {} sensors, {} sources, {} samples, seed {}",
            case,
            sources.num_sensors(),
            sources.len(),
            self.n_samples,
            seed
        );

        #[cfg(feature = "parallel")]
        let samples = reference
            .par_iter()
            .enumerate()
            .map(|(j, &r)| self.sample_sensor(case, seed, sources, j, r))
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(not(feature = "parallel"))]
        let samples = reference
            .iter()
            .enumerate()
            .map(|(j, &r)| self.sample_sensor(case, seed, sources, j, r))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SampleDistributions {
            case,
            seed,
            samples,
        })
    }

    fn sample_sensor(
        &self,
        case: Case,
        seed: u64,
        sources: &ErrorSourceTable,
        sensor: usize,
        reference: f64,
    ) -> Result<Vec<f64>, EdmfError> {
        let mut rng = sensor_rng(seed, case, sensor);
        let mut acc = vec![0.0; self.n_samples];

        for source in sources.enabled_for(sensor) {
            accumulate(&mut acc, source, reference.abs(), &mut rng)?;
        }

        Ok(acc)
    }
}

fn sensor_rng(seed: u64, case: Case, sensor: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream((case.stream_tag() << 32) | sensor as u64);
    rng
}

fn accumulate(
    acc: &mut [f64],
    source: &ErrorSource,
    scale: f64,
    rng: &mut ChaCha8Rng,
) -> Result<(), EdmfError> {
    match source.kind {
        ErrorKind::Relative => add_uniform(acc, source.low * scale, source.high * scale, rng)?,
        ErrorKind::Absolute => add_uniform(acc, source.low, source.high, rng)?,
        ErrorKind::Gaussian => {
            let normal = Normal::new(source.low, source.high).map_err(|e| {
                EdmfError::InvalidValue {
                    context: format!("gaussian error source ({e})"),
                    value: source.high.to_string(),
                }
            })?;
            for value in acc.iter_mut() {
                *value += normal.sample(rng);
            }
        }
    }
    Ok(())
}

fn add_uniform(
    acc: &mut [f64],
    low: f64,
    high: f64,
    rng: &mut ChaCha8Rng,
) -> Result<(), EdmfError> {
    // Uniform panics on non-finite bounds or a width that overflows
    if !(low.is_finite() && high.is_finite() && (high - low).is_finite()) {
        return Err(EdmfError::InvalidValue {
            context: "uniform error range".to_string(),
            value: format!("[{low}, {high}]"),
        });
    }

    // zero-width: exact constant
    if low == high {
        for value in acc.iter_mut() {
            *value += low;
        }
        return Ok(());
    }

    let uniform = Uniform::new_inclusive(low, high);
    for value in acc.iter_mut() {
        *value += uniform.sample(rng);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table(num_sensors: usize, sources: Vec<ErrorSource>) -> ErrorSourceTable {
        ErrorSourceTable::new(num_sensors, sources).unwrap()
    }

    fn variance(xs: &[f64]) -> f64 {
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
    }

    fn mean(xs: &[f64]) -> f64 {
        xs.iter().sum::<f64>() / xs.len() as f64
    }

    #[test]
    fn rejects_too_few_samples() {
        assert_eq!(
            MonteCarloSampler::new(1),
            Err(EdmfError::TooFewSamples { min: 2, got: 1 })
        );
    }

    #[test]
    fn rejects_reference_length_mismatch() {
        let sources = table(2, vec![]);
        let sampler = MonteCarloSampler::new(10).unwrap();
        assert!(matches!(
            sampler.sample(Case::Measurement, &sources, &[1.0]),
            Err(EdmfError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn degenerate_absolute_source_is_constant() {
        let sources = table(
            2,
            vec![ErrorSource::new(0.3, 0.3, ErrorKind::Absolute, vec![true, true])],
        );
        let dist = MonteCarloSampler::new(500)
            .unwrap()
            .sample(Case::Prediction, &sources, &[10.0, -4.0])
            .unwrap();

        for j in 0..2 {
            assert!(dist.sensor(j).unwrap().iter().all(|&x| x == 0.3));
        }
    }

    #[test]
    fn disabled_sensor_has_zero_distribution() {
        let sources = table(
            2,
            vec![ErrorSource::new(-1.0, 1.0, ErrorKind::Absolute, vec![true, false])],
        );
        let dist = MonteCarloSampler::new(100)
            .unwrap()
            .with_seed(3)
            .sample(Case::Measurement, &sources, &[1.0, 1.0])
            .unwrap();

        assert!(dist.sensor(1).unwrap().iter().all(|&x| x == 0.0));
        assert!(dist.sensor(0).unwrap().iter().any(|&x| x != 0.0));
    }

    #[test]
    fn relative_bounds_scale_with_absolute_reference() {
        let sources = table(
            1,
            vec![ErrorSource::new(-0.1, 0.1, ErrorKind::Relative, vec![true])],
        );
        let dist = MonteCarloSampler::new(20_000)
            .unwrap()
            .with_seed(11)
            .sample(Case::Measurement, &sources, &[-50.0])
            .unwrap();

        let samples = dist.sensor(0).unwrap();
        assert!(samples.iter().all(|&x| (-5.0..=5.0).contains(&x)));
        assert!(samples.iter().any(|&x| x < -4.0));
        assert!(samples.iter().any(|&x| x > 4.0));
    }

    #[test]
    fn gaussian_uses_low_as_mean_and_high_as_std() {
        let sources = table(
            1,
            vec![ErrorSource::new(2.0, 0.5, ErrorKind::Gaussian, vec![true])],
        );
        let dist = MonteCarloSampler::new(50_000)
            .unwrap()
            .with_seed(5)
            .sample(Case::Prediction, &sources, &[0.0])
            .unwrap();

        assert_relative_eq!(mean(dist.sensor(0).unwrap()), 2.0, epsilon = 0.02);
        assert_relative_eq!(variance(dist.sensor(0).unwrap()).sqrt(), 0.5, epsilon = 0.02);
    }

    #[test]
    fn sources_add_independently() {
        let sources = table(
            1,
            vec![
                ErrorSource::new(-1.0, 1.0, ErrorKind::Absolute, vec![true]),
                ErrorSource::new(0.0, 1.0, ErrorKind::Gaussian, vec![true]),
                ErrorSource::new(4.0, 4.0, ErrorKind::Absolute, vec![true]),
            ],
        );
        let dist = MonteCarloSampler::new(100_000)
            .unwrap()
            .with_seed(9)
            .sample(Case::Measurement, &sources, &[1.0])
            .unwrap();

        // uniform(-1,1) variance 1/3, plus unit normal
        assert_relative_eq!(variance(dist.sensor(0).unwrap()), 1.0 / 3.0 + 1.0, epsilon = 0.03);
        assert_relative_eq!(mean(dist.sensor(0).unwrap()), 4.0, epsilon = 0.02);
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let sources = table(
            3,
            vec![ErrorSource::new(-1.0, 1.0, ErrorKind::Absolute, vec![true, true, true])],
        );
        let sampler = MonteCarloSampler::new(64).unwrap().with_seed(42);
        let a = sampler.sample(Case::Measurement, &sources, &[1.0, 2.0, 3.0]).unwrap();
        let b = sampler.sample(Case::Measurement, &sources, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.seed(), 42);
    }

    #[test]
    fn cases_and_sensors_draw_distinct_streams() {
        let sources = table(
            2,
            vec![ErrorSource::new(-1.0, 1.0, ErrorKind::Absolute, vec![true, true])],
        );
        let sampler = MonteCarloSampler::new(32).unwrap().with_seed(7);
        let meas = sampler.sample(Case::Measurement, &sources, &[1.0, 1.0]).unwrap();
        let pred = sampler.sample(Case::Prediction, &sources, &[1.0, 1.0]).unwrap();

        assert_ne!(meas.sensor(0).unwrap(), meas.sensor(1).unwrap());
        assert_ne!(meas.sensor(0).unwrap(), pred.sensor(0).unwrap());
    }

    #[test]
    fn unseeded_sampling_differs_between_calls() {
        let sources = table(
            1,
            vec![ErrorSource::new(-1.0, 1.0, ErrorKind::Absolute, vec![true])],
        );
        let sampler = MonteCarloSampler::new(256).unwrap();
        let a = sampler.sample(Case::Measurement, &sources, &[1.0]).unwrap();
        let b = sampler.sample(Case::Measurement, &sources, &[1.0]).unwrap();
        assert_ne!(a.sensor(0).unwrap(), b.sensor(0).unwrap());
    }

    #[test]
    fn overflowing_absolute_range_is_rejected() {
        let sources = table(
            1,
            vec![ErrorSource::new(-1e308, 1e308, ErrorKind::Absolute, vec![true])],
        );
        let err = MonteCarloSampler::new(10)
            .unwrap()
            .with_seed(1)
            .sample(Case::Measurement, &sources, &[1.0])
            .unwrap_err();
        assert!(matches!(err, EdmfError::InvalidValue { .. }));
    }

    #[test]
    fn relative_range_overflowing_after_scaling_is_rejected() {
        let sources = table(
            1,
            vec![ErrorSource::new(-1.0, 1.0, ErrorKind::Relative, vec![true])],
        );
        let sampler = MonteCarloSampler::new(10).unwrap().with_seed(1);

        assert!(matches!(
            sampler.sample(Case::Prediction, &sources, &[1e308]),
            Err(EdmfError::InvalidValue { .. })
        ));
        assert!(sampler
            .sample(Case::Prediction, &sources, &[f64::INFINITY])
            .is_err());
        assert!(sampler.sample(Case::Prediction, &sources, &[1e300]).is_ok());
    }

    #[test]
    fn sensor_out_of_range_is_none() {
        let dist =
            SampleDistributions::from_rows(Case::Measurement, 0, vec![vec![0.0, 1.0]]).unwrap();
        assert_eq!(dist.sensor(0), Some(&[0.0, 1.0][..]));
        assert!(dist.sensor(1).is_none());
    }

    #[test]
    fn from_rows_rejects_ragged_distributions() {
        assert!(SampleDistributions::from_rows(
            Case::Measurement,
            0,
            vec![vec![0.0, 1.0], vec![0.0]]
        )
        .is_err());
    }
}
