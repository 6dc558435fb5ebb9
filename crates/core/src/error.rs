// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors from submitting a job to the backend.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Invalid subject: {0:?}")]
    InvalidSubject(String),

    #[error("Backend rejected submission ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Submission timed out")]
    Timeout,

    #[error("Malformed submission response: {0}")]
    Malformed(String),
}

/// Errors from a single status check.
///
/// A non-2xx response lands here too: a transient blip on the status endpoint
/// is a transport problem, not evidence that the job failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Status endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Status endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Status request timed out")]
    Timeout,

    #[error("Malformed status response: {0}")]
    Malformed(String),
}

/// Errors from the report endpoints (finding sets, scan history).
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Report endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Scan not found: {0}")]
    NotFound(String),

    #[error("Backend declined the request: {0}")]
    Rejected(String),

    #[error("Malformed report response: {0}")]
    Malformed(String),
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl SubmissionError {
    /// Text shown to the user: the backend's own message when it sent one.
    pub fn detail(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

impl TransportError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

impl ReportError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}
