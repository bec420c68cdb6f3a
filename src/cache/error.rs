use std::time::Duration;

use thiserror::Error;

/// Failures of the cache backends. Callers treat every variant as non-fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("cached value for `{key}` could not be encoded: {message}")]
    Encoding { key: String, message: String },
    #[error("gave up on `{key}` after {attempts} conflicting writes")]
    Contention { key: String, attempts: u32 },
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Unavailable(_) => "unavailable",
            CacheError::Timeout(_) => "timeout",
            CacheError::Encoding { .. } => "encoding",
            CacheError::Contention { .. } => "contention",
        }
    }
}
