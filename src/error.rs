use thiserror::Error;

/// Failure modes of the ingestion and transformation jobs.
///
/// Data-quality issues (nulls, duplicates) are not represented here: the
/// transformation job repairs them instead of failing.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration file could not be read or is missing required keys.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every connection attempt allowed by the retry policy failed.
    #[error("Database connection failed after {attempts} attempts: {source}")]
    ConnectionExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    /// The HTTP request itself failed (DNS, TLS, non-JSON body, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an explicit error or rate-limit message.
    #[error("{provider} API error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// The response parsed as JSON but did not have the expected shape.
    #[error("Malformed {provider} response: {message}")]
    MalformedResponse {
        provider: &'static str,
        message: String,
    },

    /// A read or write against the relational store failed.
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl PipelineError {
    pub fn malformed(provider: &'static str, message: impl Into<String>) -> Self {
        PipelineError::MalformedResponse {
            provider,
            message: message.into(),
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Provider {
            provider,
            message: message.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
