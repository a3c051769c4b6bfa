//! Error type shared by every resilience subsystem: failure classifier/
//! handler, tab handler, browser recovery, degradation coordinator,
//! checkpoint tracker, abort subsystem.

use crate::error::ErrorClass;

#[derive(Debug, thiserror::Error)]
pub enum ResilienceError {
    #[error("browser {browser_id} is in state {state:?}, cannot {action}")]
    BrowserState {
        browser_id: String,
        state: String,
        action: String,
    },

    #[error("browser session error for {browser_id}: {reason}")]
    BrowserSession { browser_id: String, reason: String },

    #[error("browser recovery exhausted for {browser_id} after {attempts} attempts")]
    BrowserManager { browser_id: String, attempts: u32 },

    #[error("tab context error: {0}")]
    TabContext(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("abort policy {policy_id} rejected: {reason}")]
    AbortRejected { policy_id: String, reason: String },

    #[error("degradation coordinator error: {0}")]
    Degradation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResilienceError {
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::BrowserState { .. } | Self::BrowserManager { .. } => ErrorClass::Recoverable,
            Self::BrowserSession { .. } => ErrorClass::Recoverable,
            Self::TabContext(_) => ErrorClass::Ignorable,
            Self::Checkpoint(_) => ErrorClass::Ignorable,
            Self::AbortRejected { .. } => ErrorClass::Ignorable,
            Self::Degradation(_) => ErrorClass::Recoverable,
            Self::Other(_) => ErrorClass::Recoverable,
        }
    }
}

pub type ResilienceResult<T> = Result<T, ResilienceError>;
