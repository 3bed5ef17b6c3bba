//! Key-value persistence for Lockbox.
//!
//! [`StorageBackend`] is deliberately dumb: string keys, opaque byte values,
//! no notion of users, secrets, or encryption. `lockbox-core` decides the key
//! layout and only ever hands this crate hashed or sealed bytes.
//!
//! Backends:
//!
//! - [`MemoryBackend`]: always built; nothing outlives the process.
//! - [`RedbBackend`]: single-file, pure Rust (feature `redb-backend`, on by default).
//! - [`RocksDbBackend`]: `RocksDB` directory (feature `rocksdb-backend`).

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_backend;

pub use error::{Op, StorageError};
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_backend::RocksDbBackend;

/// What a guarded write requires of its target key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write whether or not the key exists.
    Upsert,
    /// Write only if the key is absent.
    Insert,
    /// Write only if the key already exists.
    Replace,
}

/// Outcome of [`StorageBackend::put_guarded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guarded {
    /// The value was written.
    Written,
    /// The guard key was absent. Nothing was written.
    GuardMissing,
    /// The target key did not satisfy the [`WriteMode`]. Nothing was written.
    Refused,
}

impl Guarded {
    /// Decide a guarded write from what the backend saw inside its critical
    /// section.
    pub(crate) fn decide(guard_present: bool, key_present: bool, mode: WriteMode) -> Self {
        if !guard_present {
            return Self::GuardMissing;
        }
        let allowed = match mode {
            WriteMode::Upsert => true,
            WriteMode::Insert => !key_present,
            WriteMode::Replace => key_present,
        };
        if allowed { Self::Written } else { Self::Refused }
    }
}

/// Async key-value store shared by every Lockbox component.
///
/// Keys are `/`-separated UTF-8 paths such as `identity/alice`. Each
/// single-key write is atomic: a reader sees the old value or the new one.
/// `put_if_absent`, `put_guarded` and `delete_cascade` are atomic with
/// respect to each other and to plain writes.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Value stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write `value` at `key`, replacing what was there.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Write `value` at `key` unless the key is taken.
    ///
    /// Returns `false`, leaving the stored value alone, when `key` already
    /// exists. Two concurrent calls for the same key never both return `true`.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError>;

    /// Write `value` at `key` only while `guard` exists and `key` satisfies
    /// `mode`, checking both and writing in one atomic step.
    async fn put_guarded(
        &self,
        guard: &str,
        key: &str,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<Guarded, StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Remove `key` and every key starting with `prefix` in one atomic
    /// step, returning how many prefixed keys went.
    async fn delete_cascade(&self, key: &str, prefix: &str) -> Result<usize, StorageError>;

    /// Every key starting with `prefix`, sorted ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Whether `key` holds a value.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_guard_always_blocks() {
        for mode in [WriteMode::Upsert, WriteMode::Insert, WriteMode::Replace] {
            assert_eq!(Guarded::decide(false, false, mode), Guarded::GuardMissing);
            assert_eq!(Guarded::decide(false, true, mode), Guarded::GuardMissing);
        }
    }

    #[test]
    fn mode_decides_when_guard_present() {
        assert_eq!(Guarded::decide(true, true, WriteMode::Upsert), Guarded::Written);
        assert_eq!(Guarded::decide(true, false, WriteMode::Upsert), Guarded::Written);
        assert_eq!(Guarded::decide(true, false, WriteMode::Insert), Guarded::Written);
        assert_eq!(Guarded::decide(true, true, WriteMode::Insert), Guarded::Refused);
        assert_eq!(Guarded::decide(true, true, WriteMode::Replace), Guarded::Written);
        assert_eq!(Guarded::decide(true, false, WriteMode::Replace), Guarded::Refused);
    }
}
