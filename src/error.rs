//! Typed errors for the remote store and the metadata provider.
//!
//! Storage-facing operations never surface these to the UI layer; they are
//! matched on inside the hybrid facade to decide between fallback and logging.
//! Metadata errors are the exception and propagate to the caller.

use std::fmt;
use thiserror::Error;

/// Failure category of a remote store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// Transport failure (DNS, connect, timeout)
    Network,
    /// Missing or expired session, or row-level security rejection
    Unauthorized,
    /// Row or resource does not exist
    NotFound,
    /// Request refused by the backend (constraint violation, bad filter)
    Rejected,
    /// Backend reachable but failing (5xx) or not configured
    Unavailable,
    /// Response body didn't match the expected shape
    Decode,
    /// Write issued under an identity that is no longer current
    Stale,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteErrorKind::Network => "network",
            RemoteErrorKind::Unauthorized => "unauthorized",
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::Rejected => "rejected",
            RemoteErrorKind::Unavailable => "unavailable",
            RemoteErrorKind::Decode => "decode",
            RemoteErrorKind::Stale => "stale",
        };
        write!(f, "{}", s)
    }
}

/// A remote store failure: a matchable kind plus a human-readable message.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("remote {kind} error: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Rejected, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unavailable, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Decode, message)
    }

    pub fn stale(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Stale, message)
    }

    /// Map an HTTP status code onto a kind.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => RemoteErrorKind::Unauthorized,
            404 => RemoteErrorKind::NotFound,
            400..=499 => RemoteErrorKind::Rejected,
            _ => RemoteErrorKind::Unavailable,
        };
        Self::new(kind, message)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::from_status(status.as_u16(), err.to_string())
        } else {
            RemoteError::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::decode(err.to_string())
    }
}

/// Result type for remote store operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Errors from importing playlist/video metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Not a valid YouTube playlist or video URL: {0}")]
    InvalidUrl(String),

    #[error("No YouTube API key configured. Set one in the config file or YOUTUBE_API_KEY")]
    MissingApiKey,

    #[error("The YouTube API key is invalid. Please check your API key")]
    InvalidApiKey,

    #[error("YouTube API quota exceeded. Please try again tomorrow")]
    QuotaExceeded,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Private video or embedding disabled
    #[error("Video unavailable: {0}")]
    Unavailable(String),

    #[error("YouTube API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
