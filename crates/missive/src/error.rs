//! Error types for window resolution, fetching, caching and syncing

use std::path::PathBuf;
use std::time::Duration;

use crate::models::ConversationId;

/// The requested time window cannot be resolved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid time window: {0}")]
pub struct WindowError(pub String);

/// Failure of a single remote call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Network error, rate limiting or a 5xx response. Safe to retry.
    #[error("Transient fetch error: {message}")]
    Transient {
        message: String,
        /// Delay the service asked for before the next call (rate limiting)
        retry_after: Option<Duration>,
        /// The service throttled the caller; every worker should back off
        rate_limited: bool,
    },

    /// Bad credentials, missing resource, malformed request or response,
    /// or pagination that never ends. Never retried.
    #[error("Fatal fetch error: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
            rate_limited: false,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after,
            rate_limited: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Failure reading or writing a cache artifact
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache miss: {} does not exist", path.display())]
    Miss { path: PathBuf },

    #[error("Cache artifact {} is corrupt: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("Cannot use {0:?} as a cache key")]
    InvalidKey(String),

    #[error("Failed to encode cache artifact: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Cache I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a conversation's messages could not be cached
#[derive(Debug, thiserror::Error)]
pub enum ConversationFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Failure of a whole pull
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to fetch conversations: {0}")]
    Conversations(#[source] FetchError),

    #[error("Failed to cache conversations: {0}")]
    ConversationsCache(#[source] CacheError),

    /// Conversations were cached but at least one conversation's messages were not
    #[error(
        "Message sync failed for {} conversation(s) (first: {}); {} cached, {} not attempted",
        .0.failed.len(),
        .0.first_failed().unwrap_or("?"),
        .0.succeeded.len(),
        .0.skipped.len()
    )]
    Incomplete(crate::sync::SyncReport),
}

impl SyncError {
    /// Ids whose messages failed to sync, if the run got that far
    pub fn failed_conversations(&self) -> Vec<&ConversationId> {
        match self {
            Self::Incomplete(report) => report.failed.iter().map(|(id, _)| id).collect(),
            _ => Vec::new(),
        }
    }
}
