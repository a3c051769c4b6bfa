//! Error type for the selector resolver and its strategies.

use crate::error::ErrorClass;
use crate::selectors::model::ShapeError;

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("resolution timed out for selector {selector} after {timeout_ms}ms")]
    ResolutionTimeout { selector: String, timeout_ms: u64 },

    #[error("no strategy for {selector} reached confidence threshold {threshold} (best: {best})")]
    ConfidenceThreshold {
        selector: String,
        threshold: f32,
        best: f32,
    },

    #[error("selector shape invalid: {0}")]
    ShapeInvalid(#[from] ShapeError),

    #[error("strategy execution failed: {0}")]
    StrategyExecution(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("driver error: {0}")]
    Driver(#[from] crate::driver::DriverError),
}

impl ResolverError {
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::SelectorNotFound(_) | Self::ShapeInvalid(_) => ErrorClass::Fatal,
            Self::ResolutionTimeout { .. } | Self::Driver(_) => ErrorClass::Recoverable,
            Self::ConfidenceThreshold { .. } => ErrorClass::Recoverable,
            Self::StrategyExecution(_) | Self::Validation(_) => ErrorClass::Ignorable,
        }
    }
}

pub type ResolverResult<T> = Result<T, ResolverError>;
