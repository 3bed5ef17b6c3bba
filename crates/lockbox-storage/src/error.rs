//! Storage errors.

/// A storage operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Put,
    Delete,
    List,
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::List => "list",
        })
    }
}

/// Errors returned by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The database could not be opened or created.
    #[error("cannot open storage at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// The engine rejected an operation on `key` (a prefix, for `List`).
    #[error("storage {op} failed for '{key}': {reason}")]
    Backend {
        op: Op,
        key: String,
        reason: String,
    },

    /// A transaction could not be started, committed, or rolled back.
    #[error("storage transaction failed: {reason}")]
    Transaction { reason: String },

    /// The blocking worker running the operation died.
    #[error("storage worker failed: {reason}")]
    Worker { reason: String },

    /// A key read back from disk was not UTF-8.
    #[error("stored key is not valid UTF-8: {reason}")]
    InvalidKey { reason: String },
}

impl StorageError {
    pub(crate) fn backend(op: Op, key: &str, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            key: key.to_owned(),
            reason: reason.to_string(),
        }
    }

    #[cfg(any(feature = "redb-backend", feature = "rocksdb-backend"))]
    pub(crate) fn worker(e: &tokio::task::JoinError) -> Self {
        Self::Worker {
            reason: e.to_string(),
        }
    }
}
