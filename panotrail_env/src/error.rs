//! Error types for the Panotrail environment abstraction.

use thiserror::Error;

/// Errors that can occur while retrieving image bytes.
///
/// Both variants carry the URL that was requested so the caller can log
/// or surface it without keeping its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered with a non-success status code
    #[error("Fetch of {url} failed with HTTP status {status}")]
    Status { url: String, status: u16 },

    /// The request never produced a response (DNS, connect, reset, body read)
    #[error("Fetch of {url} failed: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    /// Creates a status error.
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Status {
            url: url.into(),
            status,
        }
    }

    /// Creates a transport error.
    pub fn transport(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Returns the URL that failed.
    pub fn url(&self) -> &str {
        match self {
            Self::Status { url, .. } | Self::Transport { url, .. } => url,
        }
    }

    /// Returns the HTTP status, if the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }
}
