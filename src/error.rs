//! Crate-wide error type.
//!
//! Mirrors the split the rest of the codebase uses: each subsystem owns a
//! small `thiserror` enum for its own failure modes, and [`EngineError`]
//! unifies them behind `#[from]` so call sites crossing subsystem
//! boundaries can use `?` without manual conversion. Orchestration code
//! that only needs to propagate, not match on, an error can use `anyhow`
//! directly, same as `browser_setup`/`browser_pool` do today.

use crate::events::EventBusError;
use crate::resilience::ResilienceError;
use crate::selectors::ResolverError;
use crate::stealth::StealthError;

/// Coarse classification used by callers deciding whether to retry,
/// degrade, or give up outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unrecoverable; the current run should stop.
    Fatal,
    /// Worth retrying, possibly after backoff.
    Recoverable,
    /// Safe to log and continue.
    Ignorable,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Stealth(#[from] StealthError),

    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("snapshot store error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::Fatal,
            Self::Resolver(e) => e.classify(),
            Self::Stealth(e) => e.classify(),
            Self::Resilience(e) => e.classify(),
            Self::EventBus(_) => ErrorClass::Ignorable,
            Self::Snapshot(_) => ErrorClass::Recoverable,
            Self::Other(_) => ErrorClass::Recoverable,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
