//! Error types for asset cache operations.

use std::path::PathBuf;

/// Errors that can occur during asset cache operations.
///
/// Validation errors (`InvalidName`, `TransactionInProgress`,
/// `TransactionClosed`) are surfaced before any I/O happens. `CorruptCache`
/// is always fatal to the operation that discovered it: it means the cache
/// directory holds state this crate did not create, and callers should treat
/// the context as needing manual intervention rather than retrying.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An asset or context name failed single-segment validation.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Which validation rule it violated.
        reason: String,
    },

    /// A transaction was requested while another one is still open.
    #[error("a transaction is already in progress for context {context:?}")]
    TransactionInProgress {
        /// Name of the busy context.
        context: String,
    },

    /// An operation was attempted on an already-committed transaction.
    #[error("transaction has already been committed")]
    TransactionClosed,

    /// A path-based content source does not resolve to an existing regular file.
    #[error("source file does not exist: {path}")]
    SourceMissing {
        /// The path that failed to resolve.
        path: PathBuf,
    },

    /// The named asset is not present in the context.
    #[error("asset not found: {name:?}")]
    AssetNotFound {
        /// The missing asset's name.
        name: String,
    },

    /// An on-disk entry violates the cache layout invariants.
    #[error("unexpected entry in cache at {path}: {reason}")]
    CorruptCache {
        /// The offending entry.
        path: PathBuf,
        /// What was found instead of what the layout requires.
        reason: String,
    },

    /// Manifest encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for cache results.
pub type CacheResult<T> = Result<T, CacheError>;
