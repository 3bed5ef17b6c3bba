//! Record store: identities and envelopes over a storage backend.
//!
//! [`RecordStore`] is the persistence contract the authenticator and the
//! vault service consume. [`BackendRecordStore`] implements it on top of any
//! [`StorageBackend`] with this key layout:
//!
//! - `identity/<username>` → `{"password_hash", "created_at"}`
//! - `envelope/<owner>/<label>` → `{"salt", "iv", "ciphertext", "updated_at"}`
//!
//! Path segments are percent-encoded so labels may contain `/`. Byte fields
//! are base64 inside JSON. Each envelope is a single value, so salt, IV, and
//! ciphertext are always written and replaced together.
//!
//! Envelope writes are guarded by the owner's identity key and account
//! deletion is a single cascade, so an envelope never outlives its owner even
//! when the two race.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use lockbox_storage::{Guarded, StorageBackend, WriteMode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::envelope::SecretEnvelope;
use crate::error::StoreError;

const IDENTITY_PREFIX: &str = "identity/";
const ENVELOPE_PREFIX: &str = "envelope/";

/// The persistence collaborator for identities and envelopes.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the stored password hash for `username`.
    async fn get_identity(&self, username: &str) -> Result<Option<String>, StoreError>;

    /// Insert a new identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if `username` is already present.
    async fn put_identity(&self, username: &str, password_hash: &str) -> Result<(), StoreError>;

    /// Remove an identity together with every envelope it owns, in one
    /// atomic step.
    async fn delete_identity(&self, username: &str) -> Result<(), StoreError>;

    /// Fetch the envelope stored under `(owner, label)`.
    async fn get_envelope(
        &self,
        owner: &str,
        label: &str,
    ) -> Result<Option<SecretEnvelope>, StoreError>;

    /// Insert or atomically replace the envelope under `(owner, label)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingOwner`] if `owner` has no identity.
    async fn put_envelope(
        &self,
        owner: &str,
        label: &str,
        envelope: &SecretEnvelope,
    ) -> Result<(), StoreError>;

    /// Insert the envelope under a new `(owner, label)`.
    ///
    /// Returns `false`, writing nothing, if the label is already taken.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingOwner`] if `owner` has no identity.
    async fn insert_envelope(
        &self,
        owner: &str,
        label: &str,
        envelope: &SecretEnvelope,
    ) -> Result<bool, StoreError>;

    /// Replace the envelope under an existing `(owner, label)`.
    ///
    /// Returns `false`, writing nothing, if there is no such label.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingOwner`] if `owner` has no identity.
    async fn replace_envelope(
        &self,
        owner: &str,
        label: &str,
        envelope: &SecretEnvelope,
    ) -> Result<bool, StoreError>;

    /// Remove the envelope under `(owner, label)`. Idempotent.
    async fn delete_envelope(&self, owner: &str, label: &str) -> Result<(), StoreError>;

    /// All labels owned by `owner`, sorted.
    async fn list_labels(&self, owner: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    password_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct EnvelopeRecord {
    salt: String,
    iv: String,
    ciphertext: String,
    updated_at: DateTime<Utc>,
}

/// A [`RecordStore`] over a key-value [`StorageBackend`].
#[derive(Clone)]
pub struct BackendRecordStore {
    storage: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for BackendRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRecordStore").finish_non_exhaustive()
    }
}

impl BackendRecordStore {
    /// Create a record store writing through `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    fn identity_key(username: &str) -> String {
        format!("{IDENTITY_PREFIX}{}", urlencoding::encode(username))
    }

    fn owner_prefix(owner: &str) -> String {
        format!("{ENVELOPE_PREFIX}{}/", urlencoding::encode(owner))
    }

    fn envelope_key(owner: &str, label: &str) -> String {
        format!("{}{}", Self::owner_prefix(owner), urlencoding::encode(label))
    }

    /// Write an envelope while its owner's identity exists. Returns whether
    /// the label satisfied `mode`.
    async fn write_envelope(
        &self,
        owner: &str,
        label: &str,
        envelope: &SecretEnvelope,
        mode: WriteMode,
    ) -> Result<bool, StoreError> {
        let key = Self::envelope_key(owner, label);
        let record = EnvelopeRecord {
            salt: BASE64.encode(envelope.salt),
            iv: BASE64.encode(envelope.iv),
            ciphertext: BASE64.encode(&envelope.ciphertext),
            updated_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| corrupt(&key, e))?;
        match self
            .storage
            .put_guarded(&Self::identity_key(owner), &key, &bytes, mode)
            .await?
        {
            Guarded::Written => Ok(true),
            Guarded::Refused => Ok(false),
            Guarded::GuardMissing => Err(StoreError::MissingOwner {
                owner: owner.to_owned(),
            }),
        }
    }
}

fn corrupt(key: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_owned(),
        reason: reason.to_string(),
    }
}

fn decode_envelope(key: &str, bytes: &[u8]) -> Result<SecretEnvelope, StoreError> {
    let record: EnvelopeRecord = serde_json::from_slice(bytes).map_err(|e| corrupt(key, e))?;
    let salt = BASE64.decode(&record.salt).map_err(|e| corrupt(key, e))?;
    let iv = BASE64.decode(&record.iv).map_err(|e| corrupt(key, e))?;
    let ciphertext = BASE64.decode(&record.ciphertext).map_err(|e| corrupt(key, e))?;
    SecretEnvelope::from_parts(&salt, &iv, ciphertext)
        .map_err(|_| corrupt(key, "salt and iv must be 16 bytes each"))
}

#[async_trait::async_trait]
impl RecordStore for BackendRecordStore {
    async fn get_identity(&self, username: &str) -> Result<Option<String>, StoreError> {
        let key = Self::identity_key(username);
        let Some(bytes) = self.storage.get(&key).await? else {
            return Ok(None);
        };
        let record: IdentityRecord =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(&key, e))?;
        Ok(Some(record.password_hash))
    }

    async fn put_identity(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
        let key = Self::identity_key(username);
        let record = IdentityRecord {
            password_hash: password_hash.to_owned(),
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| corrupt(&key, e))?;
        if self.storage.put_if_absent(&key, &bytes).await? {
            Ok(())
        } else {
            Err(StoreError::Conflict { key })
        }
    }

    async fn delete_identity(&self, username: &str) -> Result<(), StoreError> {
        let removed = self
            .storage
            .delete_cascade(&Self::identity_key(username), &Self::owner_prefix(username))
            .await?;
        debug!(envelopes = removed, "identity and owned envelopes deleted");
        Ok(())
    }

    async fn get_envelope(
        &self,
        owner: &str,
        label: &str,
    ) -> Result<Option<SecretEnvelope>, StoreError> {
        let key = Self::envelope_key(owner, label);
        match self.storage.get(&key).await? {
            None => Ok(None),
            Some(bytes) => decode_envelope(&key, &bytes).map(Some),
        }
    }

    async fn put_envelope(
        &self,
        owner: &str,
        label: &str,
        envelope: &SecretEnvelope,
    ) -> Result<(), StoreError> {
        self.write_envelope(owner, label, envelope, WriteMode::Upsert)
            .await?;
        Ok(())
    }

    async fn insert_envelope(
        &self,
        owner: &str,
        label: &str,
        envelope: &SecretEnvelope,
    ) -> Result<bool, StoreError> {
        self.write_envelope(owner, label, envelope, WriteMode::Insert)
            .await
    }

    async fn replace_envelope(
        &self,
        owner: &str,
        label: &str,
        envelope: &SecretEnvelope,
    ) -> Result<bool, StoreError> {
        self.write_envelope(owner, label, envelope, WriteMode::Replace)
            .await
    }

    async fn delete_envelope(&self, owner: &str, label: &str) -> Result<(), StoreError> {
        self.storage
            .delete(&Self::envelope_key(owner, label))
            .await?;
        Ok(())
    }

    async fn list_labels(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let prefix = Self::owner_prefix(owner);
        let mut labels = self
            .storage
            .list(&prefix)
            .await?
            .into_iter()
            .map(|key| {
                let encoded = key.strip_prefix(prefix.as_str()).unwrap_or(key.as_str());
                urlencoding::decode(encoded)
                    .map(std::borrow::Cow::into_owned)
                    .map_err(|e| corrupt(&key, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        labels.sort();
        Ok(labels)
    }
}
