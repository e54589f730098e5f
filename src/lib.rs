//! EDMF - Error-Domain Model Falsification
//!
//! Given an initial model set (IMS) of simulated model instances, real sensor
//! measurements and independent error sources for both, determines which
//! instances are not falsified by the data: the candidate model set (CMS).
//!
//! The statistical core runs in three stages:
//! Monte Carlo synthesis of combined per-sensor error distributions,
//! per-sensor threshold bounds (optionally Sidak-corrected) and a
//! consistency filter over the active sensors. [`Pipeline`] chains the stages
//! so that they can only run in order.

pub mod config;
pub mod error_source;
pub mod falsify;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod sampler;
pub mod threshold;

use thiserror::Error;

// Re-export main types
pub use config::EdmfConfig;
pub use error_source::{ErrorKind, ErrorSource, ErrorSourceTable};
pub use falsify::{falsify, DomainWarning, FalsificationOutcome};
pub use model::{ActiveSensorMask, Measurements, ModelSet};
pub use pipeline::{run, EdmfInputs, Falsified, Pipeline, Sampled, Thresholded, Uninitialized};
pub use report::{CmsRow, CmsTable, RunSummary, SamplingRecord};
pub use sampler::{Case, MonteCarloSampler, SampleDistributions};
pub use threshold::{
    compute_bounds, percentile, sidak_cutoff, ThresholdConfig, ThresholdPair, Thresholds,
};

/// Validation failures. Every variant aborts the stage that detected it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EdmfError {
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error(
        "error-source row {row} has {got} columns, expected {expected} (low, high, kind and one flag per sensor)"
    )]
    ColumnCount {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("invalid error source at row {row}: {reason}")]
    InvalidErrorSource { row: usize, reason: String },
    #[error("invalid value {value:?} in {context}")]
    InvalidValue { context: String, value: String },
    #[error("cutoff must lie strictly between 0 and 100, got {0}")]
    CutoffOutOfRange(f64),
    #[error("Sidak correction requires at least one active sensor")]
    NoActiveSensors,
    #[error("at least {min} Monte Carlo samples are required, got {got}")]
    TooFewSamples { min: usize, got: usize },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub(crate) fn ensure_len(
    context: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), EdmfError> {
    if expected == actual {
        return Ok(());
    }

    Err(EdmfError::LengthMismatch {
        context,
        expected,
        got: actual,
    })
}
