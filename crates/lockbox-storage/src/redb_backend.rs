//! Single-file backend on redb, the default for on-disk vaults.
//!
//! All records share one table; namespacing lives in the keys. Each call runs
//! in its own redb transaction on Tokio's blocking pool. redb allows one
//! writer at a time, which is what makes `put_if_absent`, `put_guarded` and
//! `delete_cascade` atomic here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use tracing::debug;

use crate::error::Op;
use crate::{Guarded, StorageBackend, StorageError, WriteMode};

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Vault file backed by redb.
///
/// ```no_run
/// # use lockbox_storage::RedbBackend;
/// let store = RedbBackend::open("lockbox.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn txn_failed(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn open_failed(path: &Path, e: impl std::fmt::Display) -> StorageError {
    StorageError::Open {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl RedbBackend {
    /// Open the vault file at `path`, creating it and its table if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or the
    /// table cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| open_failed(path, e))?;
        // Create the table up front so read transactions can always open it.
        let txn = db.begin_write().map_err(|e| open_failed(path, e))?;
        txn.open_table(RECORDS).map_err(|e| open_failed(path, e))?;
        txn.commit().map_err(|e| open_failed(path, e))?;

        debug!(path = %path.display(), "redb vault file opened");
        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Location of the vault file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&ReadTransaction) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(txn_failed)?;
            op(&txn)
        })
        .await
        .map_err(|e| StorageError::worker(&e))?
    }

    /// Run `op` in a write transaction, committing only on `Ok`.
    async fn write<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&WriteTransaction) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(txn_failed)?;
            let out = op(&txn);
            if out.is_ok() {
                txn.commit().map_err(txn_failed)?;
            } else {
                txn.abort().map_err(txn_failed)?;
            }
            out
        })
        .await
        .map_err(|e| StorageError::worker(&e))?
    }
}

fn keys_under(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    prefix: &str,
) -> Result<Vec<String>, StorageError> {
    let failed = |e: redb::StorageError| StorageError::backend(Op::List, prefix, e);
    let mut keys = Vec::new();
    for entry in table.range(prefix..).map_err(failed)? {
        let (key, _) = entry.map_err(failed)?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key.to_owned());
    }
    Ok(keys)
}

fn present(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> Result<bool, StorageError> {
    table
        .get(key)
        .map(|value| value.is_some())
        .map_err(|e| StorageError::backend(Op::Get, key, e))
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.read(move |txn| {
            let table = txn.open_table(RECORDS).map_err(txn_failed)?;
            let value = table
                .get(key.as_str())
                .map_err(|e| StorageError::backend(Op::Get, &key, e))?;
            Ok(value.map(|v| v.value().to_vec()))
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let key = key.to_owned();
        let value = value.to_vec();
        self.write(move |txn| {
            let mut table = txn.open_table(RECORDS).map_err(txn_failed)?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| StorageError::backend(Op::Put, &key, e))?;
            Ok(())
        })
        .await
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let key = key.to_owned();
        let value = value.to_vec();
        self.write(move |txn| {
            let mut table = txn.open_table(RECORDS).map_err(txn_failed)?;
            let taken = present(&table, &key)?;
            if !taken {
                table
                    .insert(key.as_str(), value.as_slice())
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
        let guard = guard.to_owned();
        let key = key.to_owned();
        let value = value.to_vec();
        self.write(move |txn| {
            let mut table = txn.open_table(RECORDS).map_err(txn_failed)?;
            let outcome = Guarded::decide(present(&table, &guard)?, present(&table, &key)?, mode);
            if outcome == Guarded::Written {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| StorageError::backend(Op::Put, &key, e))?;
            }
            Ok(outcome)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_owned();
        self.write(move |txn| {
            let mut table = txn.open_table(RECORDS).map_err(txn_failed)?;
            table
                .remove(key.as_str())
                .map_err(|e| StorageError::backend(Op::Delete, &key, e))?;
            Ok(())
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.to_owned();
        self.read(move |txn| {
            let table = txn.open_table(RECORDS).map_err(txn_failed)?;
            keys_under(&table, &prefix)
        })
        .await
    }

    async fn delete_cascade(&self, key: &str, prefix: &str) -> Result<usize, StorageError> {
        let key = key.to_owned();
        let prefix = prefix.to_owned();
        self.write(move |txn| {
            let mut table = txn.open_table(RECORDS).map_err(txn_failed)?;
            let doomed = keys_under(&table, &prefix)?;
            for doomed_key in doomed.iter().chain(std::iter::once(&key)) {
                table
                    .remove(doomed_key.as_str())
                    .map_err(|e| StorageError::backend(Op::Delete, doomed_key, e))?;
            }
            Ok(doomed.len())
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, RedbBackend) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbBackend::open(dir.path().join("vault.redb")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn write_read_remove() {
        let (_dir, store) = scratch();
        store.put("identity/alice", b"hash").await.unwrap();
        assert!(store.exists("identity/alice").await.unwrap());
        store.delete("identity/alice").await.unwrap();
        store.delete("identity/alice").await.unwrap();
        assert_eq!(store.get("identity/alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_if_absent_keeps_first_writer() {
        let (_dir, store) = scratch();
        assert!(store.put_if_absent("identity/alice", b"one").await.unwrap());
        assert!(!store.put_if_absent("identity/alice", b"two").await.unwrap());
        assert_eq!(
            store.get("identity/alice").await.unwrap().as_deref(),
            Some(&b"one"[..])
        );
    }

    #[tokio::test]
    async fn prefix_scan_and_cascade() {
        let (_dir, store) = scratch();
        for key in [
            "envelope/alice/x",
            "envelope/alice/y",
            "envelope/alice2/x",
            "identity/alice",
        ] {
            store.put(key, b"v").await.unwrap();
        }
        assert_eq!(
            store.list("envelope/alice/").await.unwrap(),
            vec!["envelope/alice/x", "envelope/alice/y"]
        );
        let removed = store
            .delete_cascade("identity/alice", "envelope/alice/")
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.list("").await.unwrap(), vec!["envelope/alice2/x"]);
    }

    async fn guarded(store: &RedbBackend, mode: WriteMode, value: &[u8]) -> Guarded {
        store
            .put_guarded("identity/alice", "envelope/alice/x", value, mode)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn guarded_writes_follow_mode() {
        let (_dir, store) = scratch();
        assert_eq!(guarded(&store, WriteMode::Upsert, b"0").await, Guarded::GuardMissing);
        store.put("identity/alice", b"h").await.unwrap();
        assert_eq!(guarded(&store, WriteMode::Replace, b"1").await, Guarded::Refused);
        assert_eq!(guarded(&store, WriteMode::Insert, b"2").await, Guarded::Written);
        assert_eq!(guarded(&store, WriteMode::Insert, b"3").await, Guarded::Refused);
        assert_eq!(guarded(&store, WriteMode::Replace, b"4").await, Guarded::Written);
        assert_eq!(
            store.get("envelope/alice/x").await.unwrap().as_deref(),
            Some(&b"4"[..])
        );
    }

    #[tokio::test]
    async fn cascade_racing_guarded_write_leaves_no_orphan() {
        let (_dir, store) = scratch();
        for round in 0..16 {
            store.put("identity/alice", b"h").await.unwrap();
            let key = format!("envelope/alice/{round}");
            let (written, removed) = tokio::join!(
                store.put_guarded("identity/alice", &key, b"v", WriteMode::Upsert),
                store.delete_cascade("identity/alice", "envelope/alice/"),
            );
            written.unwrap();
            removed.unwrap();
            assert!(store.list("").await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.redb");
        {
            let store = RedbBackend::open(&path).unwrap();
            store.put("identity/alice", b"persisted").await.unwrap();
        }
        let store = RedbBackend::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert_eq!(
            store.get("identity/alice").await.unwrap().as_deref(),
            Some(&b"persisted"[..])
        );
    }
}
