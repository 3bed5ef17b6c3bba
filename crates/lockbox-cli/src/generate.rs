//! Random passwords for `put --generate` and `update --generate`.
//!
//! Characters come from the OS CSPRNG. Every class the charset names appears
//! at least once; the rest are drawn from the union of the classes and the
//! result is shuffled.

use anyhow::{Result, bail};
use clap::ValueEnum;
use lockbox_core::SecretBytes;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;

pub const MIN_LENGTH: usize = 4;
pub const MAX_LENGTH: usize = 128;
pub const DEFAULT_LENGTH: usize = 16;

const DIGITS: &[u8] = b"0123456789";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SYMBOLS: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Character classes a generated password is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Charset {
    /// Digits only (a PIN).
    Digits,
    /// Lowercase letters.
    Lower,
    /// Lower- and uppercase letters.
    Mixed,
    /// Letters and digits.
    Alnum,
    /// Letters, digits and ASCII punctuation.
    Full,
}

impl Charset {
    fn classes(self) -> &'static [&'static [u8]] {
        match self {
            Self::Digits => &[DIGITS],
            Self::Lower => &[LOWER],
            Self::Mixed => &[LOWER, UPPER],
            Self::Alnum => &[LOWER, UPPER, DIGITS],
            Self::Full => &[LOWER, UPPER, DIGITS, SYMBOLS],
        }
    }
}

/// Generate a `length`-character password from `charset`.
pub fn password(length: usize, charset: Charset) -> Result<SecretBytes> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        bail!("password length must be between {MIN_LENGTH} and {MAX_LENGTH}");
    }
    let classes = charset.classes();
    let pool = classes.concat();
    let mut rng = OsRng;

    let mut out = Vec::with_capacity(length);
    out.extend(classes.iter().filter_map(|class| class.choose(&mut rng).copied()));
    let rest = length - out.len();
    out.extend((0..rest).filter_map(|_| pool.choose(&mut rng).copied()));
    out.shuffle(&mut rng);
    Ok(SecretBytes::new(out))
}
