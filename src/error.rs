// Error types for each collaborator boundary.
// The run driver wraps these in anyhow with context; the pipeline inspects
// them to decide whether to retry, skip or abort.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while navigating the listing site.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("timed out loading {url}")]
    Timeout { url: String },

    /// The page loaded but the element we wait for never showed up.
    #[error("page {url} never became ready: {reason}")]
    NotReady { url: String, reason: String },

    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: StatusCode },

    #[error("failed to parse {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl ScrapeError {
    pub fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ScrapeError::Timeout { url: url.to_string() }
        } else {
            ScrapeError::Http { url: url.to_string(), source }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::Timeout { .. } | ScrapeError::NotReady { .. })
    }
}

/// Failures talking to Google Drive.
#[derive(Debug, Error)]
pub enum DriveError {
    /// 404 from Drive: the parent folder (or upload session) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Drive returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("local file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("invalid destination folder id for {}", .0.display())]
    InvalidFolder(PathBuf),

    #[error("resumable upload session URI missing from response")]
    MissingSessionUri,

    #[error("failed to decode Drive response: {0}")]
    Decode(String),
}

impl DriveError {
    /// Network blips, timeouts, rate limits and server errors are worth
    /// another attempt. Everything else fails the same way twice.
    pub fn is_retriable(&self) -> bool {
        match self {
            DriveError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || e.status().is_some_and(is_transient_status)
            }
            DriveError::Status { status, body } => is_transient_status(*status) || is_rate_limited(*status, body),
            DriveError::MissingSessionUri => true,
            DriveError::NotFound(_)
            | DriveError::Auth(_)
            | DriveError::Io(_)
            | DriveError::MissingFile(_)
            | DriveError::InvalidFolder(_)
            | DriveError::Decode(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DriveError::NotFound(_))
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

// Drive reports quota exhaustion as 403 with a rate-limit reason in the body
fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    status == StatusCode::FORBIDDEN && (body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded"))
}

/// Failures writing spreadsheet artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
