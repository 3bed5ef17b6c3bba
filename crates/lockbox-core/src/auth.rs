//! Master authenticator: Argon2id hashing and verification of master
//! passwords.
//!
//! Master passwords are never stored, only their Argon2id hashes in PHC
//! string form (`$argon2id$v=19$m=…,t=…,p=…$salt$hash`). The string embeds
//! its own salt and cost parameters, so verification works for hashes made
//! under older parameters too.
//!
//! # Security model
//!
//! - Salts are 16 bytes from the OS CSPRNG, fresh per registration.
//! - Verification is argon2's own `PasswordVerifier`, which compares the
//!   recomputed output in constant time.
//! - A stored hash that does not parse is a failed verification, not an error.
//! - The authenticator is an immutable value; there is no shared hasher.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use tracing::{info, warn};

use crate::crypto;
use crate::error::AuthError;
use crate::store::RecordStore;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// One of the three Argon2id cost factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostFactor {
    Memory,
    Iterations,
    Parallelism,
}

impl HashParams {
    /// The first factor set below its Argon2id default, if any.
    #[must_use]
    pub fn below_default(&self) -> Option<CostFactor> {
        let d = Self::default();
        if self.memory_kib < d.memory_kib {
            Some(CostFactor::Memory)
        } else if self.iterations < d.iterations {
            Some(CostFactor::Iterations)
        } else if self.parallelism < d.parallelism {
            Some(CostFactor::Parallelism)
        } else {
            None
        }
    }
}

/// Hashes and verifies master passwords.
#[derive(Debug, Clone)]
pub struct MasterAuthenticator {
    params: Params,
}

impl MasterAuthenticator {
    /// Create an authenticator hashing with `params`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidParams`] if argon2 rejects the parameters
    /// (e.g. memory below `8 * parallelism` KiB).
    pub fn new(params: HashParams) -> Result<Self, AuthError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| AuthError::InvalidParams {
            reason: e.to_string(),
        })?;
        Ok(Self { params })
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `password` with a fresh random salt, returning a PHC string.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Crypto`] if the OS CSPRNG fails.
    /// - [`AuthError::Hashing`] if argon2 fails.
    pub fn hash_password(&self, password: &[u8]) -> Result<String, AuthError> {
        let mut salt_bytes = [0u8; crypto::SALT_LEN];
        crypto::fill_random(&mut salt_bytes)?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing {
            reason: e.to_string(),
        })?;

        let hash = self
            .hasher()
            .hash_password(password, &salt)
            .map_err(|e| AuthError::Hashing {
                reason: e.to_string(),
            })?;
        Ok(hash.to_string())
    }

    /// Check `password` against a stored PHC string.
    ///
    /// Returns `false` for a mismatch and for a malformed stored hash.
    #[must_use]
    pub fn verify_hash(&self, stored: &str, password: &[u8]) -> bool {
        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };
        self.hasher().verify_password(password, &parsed).is_ok()
    }

    /// Register a new identity.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidUsername`] if `username` is empty.
    /// - [`AuthError::UsernameTaken`] if `username` already exists.
    /// - [`AuthError::Crypto`] / [`AuthError::Hashing`] if hashing fails.
    /// - [`AuthError::Store`] if the record store fails.
    pub async fn register<S>(
        &self,
        store: &S,
        username: &str,
        password: &[u8],
    ) -> Result<(), AuthError>
    where
        S: RecordStore + ?Sized,
    {
        if username.is_empty() {
            return Err(AuthError::InvalidUsername);
        }

        let hash = self.hash_password(password)?;
        match store.put_identity(username, &hash).await {
            Ok(()) => {
                info!(username = %username, "identity registered");
                Ok(())
            }
            Err(crate::error::StoreError::Conflict { .. }) => Err(AuthError::UsernameTaken {
                username: username.to_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify `password` for `username`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] if no identity exists for `username`.
    /// - [`AuthError::Store`] if the record store fails.
    pub async fn verify<S>(
        &self,
        store: &S,
        username: &str,
        password: &[u8],
    ) -> Result<bool, AuthError>
    where
        S: RecordStore + ?Sized,
    {
        let stored = store
            .get_identity(username)
            .await?
            .ok_or_else(|| AuthError::NotFound {
                username: username.to_owned(),
            })?;
        Ok(self.verify_hash(&stored, password))
    }

    /// Remove `username` and every envelope it owns.
    ///
    /// Callers are expected to have verified the password first.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] if no identity exists for `username`.
    /// - [`AuthError::Store`] if the record store fails.
    pub async fn remove<S>(&self, store: &S, username: &str) -> Result<(), AuthError>
    where
        S: RecordStore + ?Sized,
    {
        if store.get_identity(username).await?.is_none() {
            return Err(AuthError::NotFound {
                username: username.to_owned(),
            });
        }
        store.delete_identity(username).await?;
        info!(username = %username, "identity removed");
        Ok(())
    }
}
