//! Error type shared by every stealth subsystem (components D-I).

use crate::error::ErrorClass;

#[derive(Debug, thiserror::Error)]
pub enum StealthError {
    #[error("fingerprint generation failed after {attempts} attempts: {reason}")]
    FingerprintGeneration { attempts: u32, reason: String },

    #[error("no proxy session available: {0}")]
    ProxyExhausted(String),

    #[error("proxy provider initialization failed: {0}")]
    ProxyInit(String),

    #[error("consent dialog did not resolve within {0:?}")]
    ConsentTimeout(std::time::Duration),

    #[error("anti-detection script injection failed: {0}")]
    MaskInjection(String),

    #[error("browser driver error: {0}")]
    Driver(#[from] crate::driver::DriverError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StealthError {
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            // A bad generated fingerprint always has a safe fallback; never
            // worth stopping the run over.
            Self::FingerprintGeneration { .. } => ErrorClass::Recoverable,
            Self::ProxyExhausted(_) | Self::ProxyInit(_) => ErrorClass::Recoverable,
            Self::ConsentTimeout(_) => ErrorClass::Ignorable,
            Self::MaskInjection(_) => ErrorClass::Ignorable,
            Self::Driver(_) => ErrorClass::Recoverable,
            Self::Other(_) => ErrorClass::Recoverable,
        }
    }
}

pub type StealthResult<T> = Result<T, StealthError>;
