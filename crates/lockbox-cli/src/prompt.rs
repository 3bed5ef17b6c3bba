//! Master password and secret value acquisition.
//!
//! Priority for the master password:
//! 1. `LOCKBOX_MASTER_PASSWORD` (for scripts and tests)
//! 2. Interactive prompt without echo via `rpassword`

use std::io::IsTerminal;

use anyhow::{Context, Result, bail};
use lockbox_core::SecretBytes;

/// Environment variable holding the master password for non-interactive use.
pub const MASTER_PASSWORD_ENV_VAR: &str = "LOCKBOX_MASTER_PASSWORD";

/// Read the master password from the environment or the terminal.
pub fn master_password() -> Result<SecretBytes> {
    if let Some(password) = from_env() {
        return Ok(password);
    }
    ask("Master password: ", Answer::Required)
}

/// Like [`master_password`], but asks twice when prompting.
pub fn new_master_password() -> Result<SecretBytes> {
    if let Some(password) = from_env() {
        return Ok(password);
    }
    let first = ask("New master password: ", Answer::Required)?;
    let second = ask("Confirm master password: ", Answer::Required)?;
    if first.expose() != second.expose() {
        bail!("master passwords do not match");
    }
    Ok(first)
}

/// Use `value` if given, otherwise prompt for it without echo. An empty
/// secret is accepted either way.
pub fn secret_value(value: Option<String>) -> Result<SecretBytes> {
    match value {
        Some(v) => Ok(SecretBytes::from(v)),
        None => ask("Secret value: ", Answer::MayBeEmpty),
    }
}

fn from_env() -> Option<SecretBytes> {
    std::env::var(MASTER_PASSWORD_ENV_VAR)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretBytes::from)
}

/// Whether an empty answer is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Required,
    MayBeEmpty,
}

fn ask(prompt: &str, kind: Answer) -> Result<SecretBytes> {
    if !std::io::stdin().is_terminal() {
        bail!("no terminal to prompt on; set {MASTER_PASSWORD_ENV_VAR} or pass --value");
    }
    let answer = rpassword::prompt_password(prompt).context("failed to read from terminal")?;
    accept(answer, kind)
}

fn accept(answer: String, kind: Answer) -> Result<SecretBytes> {
    if answer.is_empty() && kind == Answer::Required {
        bail!("empty input not allowed");
    }
    Ok(SecretBytes::from(answer))
}
