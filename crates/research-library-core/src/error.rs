//! Error taxonomy shared by the store, index, and query engine.
//!
//! An empty query result is not an error: it is reported as
//! [`Answer::NoLocalMatch`](crate::query::Answer::NoLocalMatch).

use thiserror::Error;

use crate::models::ResourceId;

/// Errors produced by core operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// No resource with this id exists in the store.
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// An I/O operation against the backing storage failed.
    #[error("storage unavailable: {context}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record exists but cannot be decoded.
    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The index failed to persist, or is known to be stale relative to
    /// the store. Recoverable by a rebuild.
    #[error("index degraded: {0}")]
    IndexDegraded(String),

    /// The string is not a well-formed resource id.
    #[error("invalid resource id: {0:?}")]
    InvalidId(String),
}

impl LibraryError {
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::StorageUnavailable {
            context: context.into(),
            source,
        }
    }

    pub fn corrupt(path: impl std::fmt::Display, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.to_string(),
            source,
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::IndexDegraded(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, LibraryError>;
