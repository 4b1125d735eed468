use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during enrichment, scoring, or persistence
#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("API error from {provider}: {message}")]
    Api { provider: &'static str, message: String },

    #[error("failed to parse {provider} response: {message}")]
    Parse { provider: &'static str, message: String },

    #[error("{provider} daily quota exhausted, resets at {resets_at}")]
    QuotaExhausted {
        provider: &'static str,
        resets_at: DateTime<Utc>,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ScreenerError {
    /// True when the provider cannot serve any further requests this run.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, ScreenerError::QuotaExhausted { .. })
    }
}
