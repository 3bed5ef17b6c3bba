//! `RocksDB` backend for vaults that already live next to a `RocksDB` stack.
//!
//! `RocksDB` is a blocking C++ library, so every call hops onto Tokio's
//! blocking pool. It offers no compare-and-set, so every write holds one
//! async mutex. Conditional writes read and write under it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch};
use tokio::sync::Mutex;

use crate::error::Op;
use crate::{Guarded, StorageBackend, StorageError, WriteMode};

type Db = DBWithThreadMode<MultiThreaded>;

/// Vault directory backed by `RocksDB`.
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<Db>,
    writers: Arc<Mutex<()>>,
    path: PathBuf,
}

impl std::fmt::Debug for RocksDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RocksDbBackend {
    /// Open the database directory at `path`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if `RocksDB` refuses the directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = Db::open(&opts, path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            db: Arc::new(db),
            writers: Arc::new(Mutex::new(())),
            path: path.to_path_buf(),
        })
    }

    /// Location of the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Db) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StorageError::worker(&e))?
    }
}

fn keys_under(db: &Db, prefix: &str) -> Result<Vec<String>, StorageError> {
    let mut keys = Vec::new();
    for entry in db.iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward)) {
        let (raw, _) = entry.map_err(|e| StorageError::backend(Op::List, prefix, e))?;
        let key = String::from_utf8(raw.into_vec()).map_err(|e| StorageError::InvalidKey {
            reason: e.to_string(),
        })?;
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key);
    }
    Ok(keys)
}

fn present(db: &Db, key: &str) -> Result<bool, StorageError> {
    db.get_pinned(key.as_bytes())
        .map(|value| value.is_some())
        .map_err(|e| StorageError::backend(Op::Get, key, e))
}

#[async_trait::async_trait]
impl StorageBackend for RocksDbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            db.get(key.as_bytes())
                .map_err(|e| StorageError::backend(Op::Get, &key, e))
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let _writer = self.writers.lock().await;
        let key = key.to_owned();
        let value = value.to_vec();
        self.blocking(move |db| {
            db.put(key.as_bytes(), value)
                .map_err(|e| StorageError::backend(Op::Put, &key, e))
        })
        .await
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let _writer = self.writers.lock().await;
        let key = key.to_owned();
        let value = value.to_vec();
        self.blocking(move |db| {
            let taken = present(db, &key)?;
            if !taken {
                db.put(key.as_bytes(), value)
                    .map_err(|e| StorageError::backend(Op::Put, &key, e))?;
            }
            Ok(!taken)
        })
        .await
    }

    async fn put_guarded(
        &self,
        guard: &str,
        key: &str,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<Guarded, StorageError> {
        let _writer = self.writers.lock().await;
        let guard = guard.to_owned();
        let key = key.to_owned();
        let value = value.to_vec();
        self.blocking(move |db| {
            let outcome = Guarded::decide(present(db, &guard)?, present(db, &key)?, mode);
            if outcome == Guarded::Written {
                db.put(key.as_bytes(), value)
                    .map_err(|e| StorageError::backend(Op::Put, &key, e))?;
            }
            Ok(outcome)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let _writer = self.writers.lock().await;
        let key = key.to_owned();
        self.blocking(move |db| {
            db.delete(key.as_bytes())
                .map_err(|e| StorageError::backend(Op::Delete, &key, e))
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.to_owned();
        self.blocking(move |db| keys_under(db, &prefix)).await
    }

    async fn delete_cascade(&self, key: &str, prefix: &str) -> Result<usize, StorageError> {
        let _writer = self.writers.lock().await;
        let key = key.to_owned();
        let prefix = prefix.to_owned();
        self.blocking(move |db| {
            let doomed = keys_under(db, &prefix)?;
            let mut batch = WriteBatch::default();
            for doomed_key in &doomed {
                batch.delete(doomed_key.as_bytes());
            }
            batch.delete(key.as_bytes());
            db.write(batch)
                .map_err(|e| StorageError::backend(Op::Delete, &key, e))?;
            Ok(doomed.len())
        })
        .await
    }
}
