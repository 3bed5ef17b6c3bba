//! Envelope engine: seal and open one secret at a time.
//!
//! An envelope is a self-contained `{salt, iv, ciphertext}` triple. Sealing
//! draws a fresh salt and a fresh IV from the OS CSPRNG, derives a key from
//! the master password with PBKDF2-HMAC-SHA256, and encrypts with
//! AES-256-CBC/PKCS#7. Opening re-derives the key from the stored salt.
//!
//! The engine is an immutable value holding only the iteration count. It
//! never retains passwords, keys, or plaintext past the call that received
//! them, so one engine can be shared freely across threads.
//!
//! Updating a secret is just another [`EnvelopeEngine::seal`] whose result
//! replaces the stored envelope as a unit; ciphertext is never patched.

use std::num::NonZeroU32;

use crate::crypto::{self, DerivedKey, IV_LEN, SALT_LEN};
use crate::error::CryptoError;
use crate::secret::SecretBytes;

/// A sealed secret: everything needed to recover the plaintext given the
/// master password.
///
/// The three fields must be persisted together, atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEnvelope {
    /// Random per-envelope PBKDF2 salt.
    pub salt: [u8; SALT_LEN],
    /// Random per-envelope CBC IV.
    pub iv: [u8; IV_LEN],
    /// AES-256-CBC ciphertext, a positive multiple of 16 bytes.
    pub ciphertext: Vec<u8>,
}

impl SecretEnvelope {
    /// Rebuild an envelope from stored byte fields.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if the salt or IV has the
    /// wrong length; a malformed envelope can never be opened.
    pub fn from_parts(salt: &[u8], iv: &[u8], ciphertext: Vec<u8>) -> Result<Self, CryptoError> {
        let salt = salt.try_into().map_err(|_| CryptoError::DecryptionFailed)?;
        let iv = iv.try_into().map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(Self {
            salt,
            iv,
            ciphertext,
        })
    }
}

/// Seals and opens [`SecretEnvelope`]s under a master password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeEngine {
    iterations: NonZeroU32,
}

impl EnvelopeEngine {
    /// Reference PBKDF2 iteration count.
    pub const DEFAULT_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
        Some(n) => n,
        None => NonZeroU32::MIN,
    };

    /// Create an engine deriving keys with `iterations` PBKDF2 rounds.
    #[must_use]
    pub fn new(iterations: NonZeroU32) -> Self {
        Self { iterations }
    }

    /// The PBKDF2 iteration count this engine uses.
    #[must_use]
    pub fn iterations(&self) -> NonZeroU32 {
        self.iterations
    }

    /// Derive the envelope key for `password` and `salt`.
    #[must_use]
    pub fn derive_key(&self, password: &[u8], salt: &[u8; SALT_LEN]) -> DerivedKey {
        crypto::derive_key(password, salt, self.iterations)
    }

    /// Seal `plaintext` under `password` into a fresh envelope.
    ///
    /// An empty plaintext is valid and produces one block of ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomnessUnavailable`] if the OS CSPRNG fails.
    /// Nothing is retried.
    pub fn seal(&self, plaintext: &[u8], password: &[u8]) -> Result<SecretEnvelope, CryptoError> {
        let salt = crypto::random_block()?;
        let iv = crypto::random_block()?;
        let key = self.derive_key(password, &salt);
        let ciphertext = crypto::encrypt_cbc(&key, &iv, plaintext);
        Ok(SecretEnvelope {
            salt,
            iv,
            ciphertext,
        })
    }

    /// Open `envelope` with `password`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] for a wrong password and for
    /// corrupted or tampered ciphertext alike. Callers should treat it as
    /// "re-enter the master password"; retrying the same inputs cannot succeed.
    ///
    /// CBC carries no MAC, so a wrong key is caught by the padding check
    /// alone. Roughly one wrong key in 256 unpads cleanly and yields garbage
    /// instead of an error; it never yields the original plaintext.
    pub fn open(
        &self,
        envelope: &SecretEnvelope,
        password: &[u8],
    ) -> Result<SecretBytes, CryptoError> {
        let key = self.derive_key(password, &envelope.salt);
        let mut plaintext = crypto::decrypt_cbc(&key, &envelope.iv, &envelope.ciphertext)?;
        Ok(SecretBytes::new(std::mem::take(&mut *plaintext)))
    }
}

impl Default for EnvelopeEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ITERATIONS)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::crypto::BLOCK_LEN;

    fn fast_engine() -> EnvelopeEngine {
        EnvelopeEngine::new(NonZeroU32::new(1_000).unwrap())
    }

    #[test]
    fn default_uses_reference_iterations() {
        assert_eq!(EnvelopeEngine::default().iterations().get(), 100_000);
    }

    #[test]
    fn seal_open_with_default_engine() {
        let engine = EnvelopeEngine::default();
        let envelope = engine.seal(b"sup3rSecret!", b"masterpw").unwrap();

        assert_eq!(envelope.salt.len(), 16);
        assert_eq!(envelope.iv.len(), 16);
        assert!(!envelope.ciphertext.is_empty());
        assert_eq!(envelope.ciphertext.len() % BLOCK_LEN, 0);

        let opened = engine.open(&envelope, b"masterpw").unwrap();
        assert_eq!(opened.expose(), b"sup3rSecret!");

        assert_fails_closed(engine.open(&envelope, b"wrongpw"), b"sup3rSecret!");
    }

    /// Unauthenticated CBC can only reject a wrong key through the padding
    /// check, which a random key passes about once in 256 tries. Whatever
    /// happens, the original plaintext must not come back.
    fn assert_fails_closed(result: Result<SecretBytes, CryptoError>, original: &[u8]) {
        match result {
            Err(CryptoError::DecryptionFailed) => {}
            Ok(p) => assert_ne!(p.expose(), original),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn wrong_password_is_rejected_by_padding() {
        let engine = fast_engine();
        let mut rejected = 0;
        for _ in 0..64 {
            let envelope = engine.seal(b"CorrectHorse1", b"m1").unwrap();
            let result = engine.open(&envelope, b"m2");
            if matches!(result, Err(CryptoError::DecryptionFailed)) {
                rejected += 1;
            } else {
                assert_fails_closed(result, b"CorrectHorse1");
            }
        }
        assert!(rejected >= 56, "only {rejected}/64 wrong-password opens rejected");
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let engine = fast_engine();
        let envelope = engine.seal(b"", b"pw").unwrap();
        assert_eq!(envelope.ciphertext.len(), BLOCK_LEN);
        let opened = engine.open(&envelope, b"pw").unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn same_input_seals_differently() {
        let engine = fast_engine();
        let a = engine.seal(b"same secret", b"pw").unwrap();
        let b = engine.seal(b"same secret", b"pw").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn salt_and_iv_are_independent() {
        let engine = fast_engine();
        let envelope = engine.seal(b"x", b"pw").unwrap();
        assert_ne!(envelope.salt, envelope.iv);
    }

    #[test]
    fn salts_and_ivs_never_repeat() {
        let engine = fast_engine();
        let mut salts = HashSet::new();
        let mut ivs = HashSet::new();
        for i in 0..64u8 {
            let envelope = engine.seal(&[i], b"pw").unwrap();
            assert!(salts.insert(envelope.salt));
            assert!(ivs.insert(envelope.iv));
        }
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let engine = fast_engine();
        let mut envelope = engine.seal(b"do not tamper", b"pw").unwrap();
        let last = envelope.ciphertext.len() - 1;
        envelope.ciphertext[last] ^= 0xFF;
        assert_fails_closed(engine.open(&envelope, b"pw"), b"do not tamper");
    }

    #[test]
    fn truncated_ciphertext_fails_closed() {
        let engine = fast_engine();
        let mut envelope = engine.seal(b"0123456789abcdef0123", b"pw").unwrap();
        envelope.ciphertext.truncate(BLOCK_LEN - 1);
        assert!(matches!(
            engine.open(&envelope, b"pw"),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn swapped_salt_fails_or_garbles() {
        let engine = fast_engine();
        let mut envelope = engine.seal(b"secret", b"pw").unwrap();
        envelope.salt = [0u8; SALT_LEN];
        assert_fails_closed(engine.open(&envelope, b"pw"), b"secret");
    }

    #[test]
    fn from_parts_rejects_bad_lengths() {
        assert!(matches!(
            SecretEnvelope::from_parts(&[0u8; 15], &[0u8; 16], vec![0u8; 16]),
            Err(CryptoError::DecryptionFailed)
        ));
        assert!(matches!(
            SecretEnvelope::from_parts(&[0u8; 16], &[0u8; 17], vec![0u8; 16]),
            Err(CryptoError::DecryptionFailed)
        ));
        assert!(SecretEnvelope::from_parts(&[0u8; 16], &[0u8; 16], vec![0u8; 16]).is_ok());
    }

    #[test]
    fn engine_key_matches_free_function() {
        let engine = fast_engine();
        let salt = [5u8; SALT_LEN];
        assert_eq!(
            engine.derive_key(b"pw", &salt),
            crypto::derive_key(b"pw", &salt, engine.iterations())
        );
    }
}
