//! Vault configuration.
//!
//! Loads cost parameters from environment variables with sensible defaults.
//! Every setting can be overridden via a `LOCKBOX_*` environment variable.

use std::num::NonZeroU32;

use crate::auth::{CostFactor, HashParams, MasterAuthenticator};
use crate::envelope::EnvelopeEngine;
use crate::error::{AuthError, ConfigError};

/// Lowest accepted PBKDF2 iteration count.
pub const MIN_KDF_ITERATIONS: u32 = 10_000;

/// Highest accepted PBKDF2 iteration count.
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

const KDF_ITERATIONS_VAR: &str = "LOCKBOX_KDF_ITERATIONS";
const ARGON2_MEMORY_VAR: &str = "LOCKBOX_ARGON2_MEMORY_KIB";
const ARGON2_ITERATIONS_VAR: &str = "LOCKBOX_ARGON2_ITERATIONS";
const ARGON2_PARALLELISM_VAR: &str = "LOCKBOX_ARGON2_PARALLELISM";

/// Cost parameters for the envelope engine and the master authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultConfig {
    /// PBKDF2-HMAC-SHA256 iterations per envelope key.
    pub kdf_iterations: NonZeroU32,
    /// Argon2id parameters for master password hashes.
    pub hash: HashParams,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: EnvelopeEngine::DEFAULT_ITERATIONS,
            hash: HashParams::default(),
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `LOCKBOX_KDF_ITERATIONS`: PBKDF2 iterations (default: `100000`,
    ///   accepted `10000..=10000000`)
    /// - `LOCKBOX_ARGON2_MEMORY_KIB`: Argon2id memory cost (default: `19456`)
    /// - `LOCKBOX_ARGON2_ITERATIONS`: Argon2id passes (default: `2`)
    /// - `LOCKBOX_ARGON2_PARALLELISM`: Argon2id lanes (default: `1`)
    ///
    /// Argon2id values below the defaults are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let iterations = parse_u32(&lookup, KDF_ITERATIONS_VAR, defaults.kdf_iterations.get())?;
        if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&iterations) {
            return Err(invalid(
                KDF_ITERATIONS_VAR,
                format!("must be between {MIN_KDF_ITERATIONS} and {MAX_KDF_ITERATIONS}"),
            ));
        }
        let kdf_iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| invalid(KDF_ITERATIONS_VAR, "must be non-zero"))?;

        let hash = HashParams {
            memory_kib: parse_u32(&lookup, ARGON2_MEMORY_VAR, defaults.hash.memory_kib)?,
            iterations: parse_u32(&lookup, ARGON2_ITERATIONS_VAR, defaults.hash.iterations)?,
            parallelism: parse_u32(&lookup, ARGON2_PARALLELISM_VAR, defaults.hash.parallelism)?,
        };
        if let Some(factor) = hash.below_default() {
            let (var, floor) = match factor {
                CostFactor::Memory => (ARGON2_MEMORY_VAR, defaults.hash.memory_kib),
                CostFactor::Iterations => (ARGON2_ITERATIONS_VAR, defaults.hash.iterations),
                CostFactor::Parallelism => (ARGON2_PARALLELISM_VAR, defaults.hash.parallelism),
            };
            return Err(invalid(var, format!("must be at least {floor}")));
        }

        Ok(Self {
            kdf_iterations,
            hash,
        })
    }

    /// Build the envelope engine for these settings.
    #[must_use]
    pub fn engine(&self) -> EnvelopeEngine {
        EnvelopeEngine::new(self.kdf_iterations)
    }

    /// Build the master authenticator for these settings.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidParams`] if argon2 rejects the parameters.
    pub fn authenticator(&self) -> Result<MasterAuthenticator, AuthError> {
        MasterAuthenticator::new(self.hash)
    }
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_owned(),
        reason: reason.into(),
    }
}

fn parse_u32(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| invalid(var, e.to_string())),
    }
}
