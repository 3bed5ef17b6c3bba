//! Core library for `Lockbox`.
//!
//! Contains the cryptographic primitives, the envelope engine that seals
//! each secret under its own salt and IV, the Argon2id master
//! authenticator, the record store for identities and envelopes, and the
//! vault session service that ties them together. This crate depends on
//! `lockbox-storage` for the storage backend trait and knows nothing about
//! the command line.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod secret;
pub mod store;
pub mod vault;

pub use auth::{CostFactor, HashParams, MasterAuthenticator};
pub use config::VaultConfig;
pub use envelope::{EnvelopeEngine, SecretEnvelope};
pub use error::{AuthError, ConfigError, CryptoError, StoreError, VaultError};
pub use secret::SecretBytes;
pub use store::{BackendRecordStore, RecordStore};
pub use vault::{Session, Vault};
