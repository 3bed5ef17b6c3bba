//! Storage backend selection.

use std::sync::Arc;

use anyhow::Result;
#[cfg(any(feature = "redb-backend", feature = "rocksdb-backend"))]
use anyhow::Context;
use clap::ValueEnum;
use lockbox_storage::{MemoryBackend, StorageBackend};
use tracing::{info, warn};

/// Supported storage backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// In-memory (data lost on exit).
    Memory,
    /// Redb persistent storage.
    Redb,
    /// `RocksDB` persistent storage.
    Rocksdb,
}

/// Open the backend selected by `kind`.
pub fn open(kind: StorageKind, path: &str) -> Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match kind {
        StorageKind::Memory => {
            warn!("using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "redb-backend")]
        StorageKind::Redb => {
            info!(path = %path, "using redb storage");
            Arc::new(
                lockbox_storage::RedbBackend::open(path).context("failed to open redb storage")?,
            )
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageKind::Redb => {
            let _ = path;
            anyhow::bail!("redb backend requested but feature 'redb-backend' is not enabled");
        }
        #[cfg(feature = "rocksdb-backend")]
        StorageKind::Rocksdb => {
            info!(path = %path, "using RocksDB storage");
            Arc::new(
                lockbox_storage::RocksDbBackend::open(path)
                    .context("failed to open RocksDB storage")?,
            )
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StorageKind::Rocksdb => {
            anyhow::bail!("RocksDB backend requested but feature 'rocksdb-backend' is not enabled");
        }
    };
    Ok(storage)
}
