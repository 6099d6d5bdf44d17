use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Closed set of failure kinds a source client can report.
///
/// The classifier matches on these first and only falls back to message
/// phrases for details the kind cannot carry (e.g. "please wait" on a 401).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimited,
    NotFound,
    AuthRequired,
    AccessDenied,
    Connection,
    Timeout,
    Http(u16),
    Parse,
    InvalidJob,
    Cancelled,
    Other,
}

impl ErrorKind {
    /// Map an HTTP status returned by an upstream into a kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::AuthRequired,
            403 => ErrorKind::AccessDenied,
            404 | 410 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimited,
            other => ErrorKind::Http(other),
        }
    }

    /// Map a transport-level reqwest failure into a kind.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            ErrorKind::Connection
        } else if err.is_decode() {
            ErrorKind::Parse
        } else if let Some(status) = err.status() {
            ErrorKind::from_status(status.as_u16())
        } else {
            ErrorKind::Other
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimited => f.write_str("rate limited"),
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::AuthRequired => f.write_str("authentication required"),
            ErrorKind::AccessDenied => f.write_str("access denied"),
            ErrorKind::Connection => f.write_str("connection error"),
            ErrorKind::Timeout => f.write_str("timeout"),
            ErrorKind::Http(status) => write!(f, "HTTP {status}"),
            ErrorKind::Parse => f.write_str("parse error"),
            ErrorKind::InvalidJob => f.write_str("invalid job"),
            ErrorKind::Cancelled => f.write_str("cancelled"),
            ErrorKind::Other => f.write_str("error"),
        }
    }
}

/// A fetch failure. `message` is classified and published; the request URL is
/// kept in `url` for logging.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SourceError {
    pub kind: ErrorKind,
    pub message: String,
    pub url: Option<String>,
}

impl SourceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn http(url: &str, err: reqwest::Error) -> Self {
        let kind = ErrorKind::from_reqwest(&err);
        let err = err.without_url();
        let mut message = format!("Request error: {err}");
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(&format!(": {cause}"));
            source = cause.source();
        }
        Self::new(kind, message).with_url(url)
    }

    pub fn status(url: &str, status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP error: {status}")
        } else {
            let snippet: String = body.chars().take(200).collect();
            format!("HTTP error: {status}: {snippet}")
        };
        Self::new(ErrorKind::from_status(status), message).with_url(url)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "fetch cancelled")
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode job payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of a single collector job, returned to the queue runner after the
/// error result has been published.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job data: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Invalid source type: {actual}. Expected '{expected}'")]
    SourceTypeMismatch { expected: String, actual: String },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to publish result: {0}")]
    Publish(#[source] anyhow::Error),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::InvalidPayload(_) | JobError::SourceTypeMismatch { .. } => ErrorKind::InvalidJob,
            JobError::Source(e) => e.kind,
            JobError::Publish(_) => ErrorKind::Other,
        }
    }

    /// Request URL of a failed fetch, for logging.
    pub fn url(&self) -> Option<&str> {
        match self {
            JobError::Source(e) => e.url.as_deref(),
            _ => None,
        }
    }
}
