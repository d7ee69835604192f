//! Error taxonomy for the admission engine.
//!
//! Most of these never reach UI callers: gates log them and degrade to a
//! conservative answer. The only error a public operation returns is
//! `ConsentError::InitializationInProgress`.

use thiserror::Error;

/// Error reported by an external adapter (consent SDK, ad SDK).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    pub code: i32,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

/// Ad load failure, retained on the surface until the next load attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ad load failed ({code}): {message}")]
pub struct AdLoadError {
    pub code: i32,
    pub message: String,
}

impl AdLoadError {
    pub fn new(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

impl From<ProviderError> for AdLoadError {
    fn from(e: ProviderError) -> Self {
        Self {
            code: e.code,
            message: e.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsentError {
    #[error("consent initialization already in progress")]
    InitializationInProgress,
    #[error("consent provider failed: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read key {key}: {message}")]
    Read { key: String, message: String },
    #[error("failed to write key {key}: {message}")]
    Write { key: String, message: String },
    #[error("failed to (de)serialize key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
