//! Cryptographic primitives for Lockbox.
//!
//! Provides PBKDF2-HMAC-SHA256 key derivation, AES-256-CBC with PKCS#7
//! padding, and OS CSPRNG access. Key material lives in zeroize-on-drop
//! newtypes and is never exposed in `Debug` output.
//!
//! # Security model
//!
//! - Salts and IVs are drawn from `OsRng` on every call, never from a
//!   counter or from each other.
//! - Every decrypt-side failure maps to [`CryptoError::DecryptionFailed`]
//!   with no further detail, so callers cannot build a padding oracle.
//! - Decryption happens in a [`Zeroizing`] buffer that is wiped on both the
//!   success and the error path.

use std::fmt;
use std::num::NonZeroU32;

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, Iv, Key, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Length of the per-envelope key-derivation salt.
pub const SALT_LEN: usize = 16;

/// Length of the CBC initialization vector (one AES block).
pub const IV_LEN: usize = 16;

/// Length of the derived AES-256 key.
pub const KEY_LEN: usize = 32;

/// AES block size; ciphertext is always a positive multiple of it.
pub const BLOCK_LEN: usize = 16;

/// A 256-bit key derived from a master password, zeroized on drop.
///
/// Equality is constant-time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    /// Borrow the raw key bytes.
    ///
    /// Never log or persist the returned bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for DerivedKey {}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit key from `password` and `salt` with PBKDF2-HMAC-SHA256.
///
/// Deterministic: identical inputs always produce the identical key.
#[must_use]
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN], iterations: NonZeroU32) -> DerivedKey {
    let mut key = DerivedKey([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations.get(), &mut key.0);
    key
}

/// Fill `buf` from the operating system's CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomnessUnavailable`] if the OS cannot supply
/// random bytes. This is fatal; callers must not fall back to a weaker source.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|_| CryptoError::RandomnessUnavailable)
}

/// Generate a fresh random 16-byte array (salt or IV).
///
/// # Errors
///
/// Returns [`CryptoError::RandomnessUnavailable`] if the OS CSPRNG fails.
pub fn random_block() -> Result<[u8; 16], CryptoError> {
    let mut block = [0u8; 16];
    fill_random(&mut block)?;
    Ok(block)
}

/// Encrypt `plaintext` with AES-256-CBC and PKCS#7 padding.
///
/// Never fails: padding always succeeds, and an empty plaintext becomes one
/// full block of padding.
#[must_use]
pub fn encrypt_cbc(key: &DerivedKey, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(
        Key::<Aes256CbcEnc>::from_slice(key.as_bytes()),
        Iv::<Aes256CbcEnc>::from_slice(iv),
    )
    .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt AES-256-CBC ciphertext and strip PKCS#7 padding.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] if the ciphertext is empty, is
/// not a whole number of blocks, or does not unpad cleanly.
pub fn decrypt_cbc(
    key: &DerivedKey,
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::DecryptionFailed);
    }

    let mut buf = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = Aes256CbcDec::new(
        Key::<Aes256CbcDec>::from_slice(key.as_bytes()),
        Iv::<Aes256CbcDec>::from_slice(iv),
    )
    .decrypt_padded_mut::<Pkcs7>(buf.as_mut_slice())
    .map_err(|_| CryptoError::DecryptionFailed)?
    .len();
    buf.truncate(plaintext_len);
    Ok(buf)
}
