//! Error types for `lockbox-core`.
//!
//! Variants carry enough context to diagnose a failure without a debugger,
//! but never key material, passwords, or plaintext. Decrypt-side failures
//! collapse into a single [`CryptoError::DecryptionFailed`] with no detail.

use lockbox_storage::StorageError;

/// Errors from the envelope engine and its primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The envelope could not be opened: wrong password, corrupted
    /// ciphertext, bad padding, or malformed salt/IV. Deliberately opaque.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The operating system's CSPRNG could not supply random bytes.
    #[error("secure random source unavailable")]
    RandomnessUnavailable,
}

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An atomic insert found the key already present.
    #[error("record already exists at '{key}'")]
    Conflict { key: String },

    /// An envelope was written for an owner with no identity record.
    #[error("no identity for owner '{owner}'")]
    MissingOwner { owner: String },

    /// A stored record could not be decoded.
    #[error("corrupt record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// The underlying storage backend returned an error.
    #[error("store backend error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from master-password registration and verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The username is already registered.
    #[error("username '{username}' is already taken")]
    UsernameTaken { username: String },

    /// No identity exists for the username.
    #[error("no identity registered for '{username}'")]
    NotFound { username: String },

    /// The username is empty.
    #[error("username must not be empty")]
    InvalidUsername,

    /// The Argon2 cost parameters were rejected.
    #[error("invalid password hashing parameters: {reason}")]
    InvalidParams { reason: String },

    /// Computing the password hash failed.
    #[error("password hashing failed: {reason}")]
    Hashing { reason: String },

    /// Salt generation failed.
    #[error("auth crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The record store returned an error.
    #[error("auth store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the vault session service.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The master password did not match the stored hash.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A secret with this label already exists for the session's owner.
    #[error("a secret labelled '{label}' already exists")]
    LabelExists { label: String },

    /// No secret with this label exists for the session's owner.
    #[error("no secret labelled '{label}'")]
    SecretNotFound { label: String },

    /// Registration or verification failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Sealing or opening an envelope failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The record store returned an error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
