//! Error types for the layered store.

use thiserror::Error;

/// Typed failure classes surfaced by store operations.
///
/// Operations return `eyre::Result`, so callers that only want a message can
/// print the report; callers that need to branch on the failure class can
/// `downcast_ref::<StoreError>()` through the context chain.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation extends past the configured strict size limit.
    #[error("{op} of {len} bytes at offset {offset} exceeds strict size enforcement ({limit})")]
    LimitExceeded {
        /// Operation that was rejected.
        op: &'static str,
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// Strict read past the current store size.
    #[error("read of {len} bytes at offset {offset} is out of range (store size {size})")]
    OutOfRange {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Store size at the time of the read.
        size: u64,
    },

    /// A backend operation failed.
    #[error("backend {op} failed: {message}")]
    Backend {
        /// Backend operation that failed.
        op: &'static str,
        /// Rendered backend failure.
        message: String,
    },

    /// The backend file does not exist and creation was not permitted.
    #[error("backend file not found: {path}")]
    NotFound {
        /// Path or name of the missing backing file.
        path: String,
    },

    /// The store has been closed or unlinked.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a backend failure from any displayable source.
    pub fn backend(op: &'static str, source: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            message: source.to_string(),
        }
    }

    /// Creates a not-found error for the given path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }
}
