use thiserror::Error;

use crate::common::error::SimScaleError::GenericError;

#[derive(Debug, Error)]
pub enum SimScaleError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// Sizing inputs or required identifiers are unusable. Never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The pool backend rejected an operation.
    #[error("Backend error: {0}")]
    BackendError(String),
    /// A price could not be determined; callers continue without an estimate.
    #[error("Pricing unavailable: {0}")]
    PricingUnavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Subprocess error: {0}")]
    SubprocessError(String),
    /// The session registry reported that the session id is no longer valid.
    #[error("Invalid session {0}")]
    InvalidSession(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<serde_json::error::Error> for SimScaleError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for SimScaleError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(format!("{error:?}"))
    }
}

impl From<toml::de::Error> for SimScaleError {
    fn from(error: toml::de::Error) -> Self {
        Self::DeserializationError(error.to_string())
    }
}

pub fn error<T>(message: String) -> crate::Result<T> {
    Err(GenericError(message))
}

impl From<String> for SimScaleError {
    fn from(e: String) -> Self {
        GenericError(e)
    }
}
