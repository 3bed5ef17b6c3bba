//! Process-local storage for tests and throwaway sessions.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{Guarded, StorageBackend, StorageError, WriteMode};

/// Sorted in-memory map. Cloning yields a handle onto the same map.
///
/// ```
/// # use lockbox_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryBackend::new();
/// assert!(store.put_if_absent("identity/alice", b"hash").await.unwrap());
/// assert!(store.exists("identity/alice").await.unwrap());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn under<'a>(
    map: &'a BTreeMap<String, Vec<u8>>,
    prefix: &'a str,
) -> impl Iterator<Item = &'a String> + 'a {
    map.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .map(|(key, _)| key)
        .take_while(move |key| key.starts_with(prefix))
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_owned(), value.to_vec());
        Ok(true)
    }

    async fn put_guarded(
        &self,
        guard: &str,
        key: &str,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<Guarded, StorageError> {
        let mut entries = self.entries.write().await;
        let outcome = Guarded::decide(entries.contains_key(guard), entries.contains_key(key), mode);
        if outcome == Guarded::Written {
            entries.insert(key.to_owned(), value.to_vec());
        }
        Ok(outcome)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_cascade(&self, key: &str, prefix: &str) -> Result<usize, StorageError> {
        let mut entries = self.entries.write().await;
        let doomed: Vec<String> = under(&entries, prefix).cloned().collect();
        for doomed_key in &doomed {
            entries.remove(doomed_key);
        }
        entries.remove(key);
        Ok(doomed.len())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        Ok(under(&entries, prefix).cloned().collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.read().await.contains_key(key))
    }
}
