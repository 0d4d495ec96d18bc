use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid scope pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    #[error("No element matches signature {signature}")]
    ElementNotFound { signature: String },

    #[error("Required signatures never appeared after {attempts} reloads: {missing}")]
    RequiredSignaturesMissing { attempts: usize, missing: String },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Errors that must stop the whole crawl rather than a single page or branch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::InvariantViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
