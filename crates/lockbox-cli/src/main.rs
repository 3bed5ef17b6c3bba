//! `Lockbox` CLI: a local password vault.
//!
//! Every secret is sealed under the master password with its own salt and
//! IV. Master passwords are stored only as Argon2id hashes.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod generate;
mod prompt;
mod storage;

use std::io::Write as _;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lockbox_core::{BackendRecordStore, SecretBytes, Vault, VaultConfig};
use tracing::debug;

use crate::generate::Charset;
use crate::storage::StorageKind;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";

// ── CLI structure ────────────────────────────────────────────────────

/// Lockbox: a local password vault.
#[derive(Parser)]
#[command(
    name = "lockbox",
    version,
    about = "Lockbox CLI: store, retrieve, and manage secrets under a master password",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         LOCKBOX_MASTER_PASSWORD      Master password (prompted if unset)\n  \
         LOCKBOX_KDF_ITERATIONS       PBKDF2 iterations per secret (default: 100000)\n  \
         LOCKBOX_ARGON2_MEMORY_KIB    Argon2id memory cost (default: 19456)\n\n\
         {DIM}Examples:{RESET}\n  \
         lockbox register alice\n  \
         lockbox put alice github\n  \
         lockbox put alice bank --generate --length 24 --charset alnum\n  \
         lockbox get alice github"
    ),
)]
struct Cli {
    /// Storage backend.
    #[arg(long, env = "LOCKBOX_STORAGE", value_enum, default_value_t = StorageKind::Redb)]
    storage: StorageKind,

    /// Path for persistent backends.
    #[arg(long, env = "LOCKBOX_STORAGE_PATH", default_value = "./lockbox.redb")]
    path: String,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "LOCKBOX_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account.
    Register {
        /// Account name.
        user: String,
    },
    /// Check a master password.
    Verify {
        /// Account name.
        user: String,
    },
    /// Store a new secret.
    Put {
        /// Account name.
        user: String,
        /// Label to store the secret under.
        label: String,
        /// Secret value (prompted without echo if omitted).
        #[arg(long)]
        value: Option<String>,
        #[command(flatten)]
        generator: GenerateArgs,
    },
    /// Print a secret to stdout.
    Get {
        /// Account name.
        user: String,
        /// Label of the secret.
        label: String,
    },
    /// Replace an existing secret.
    Update {
        /// Account name.
        user: String,
        /// Label of the secret.
        label: String,
        /// New secret value (prompted without echo if omitted).
        #[arg(long)]
        value: Option<String>,
        #[command(flatten)]
        generator: GenerateArgs,
    },
    /// Delete a secret.
    Rm {
        /// Account name.
        user: String,
        /// Label of the secret.
        label: String,
    },
    /// List secret labels.
    List {
        /// Account name.
        user: String,
    },
    /// Delete an account and all of its secrets.
    #[command(name = "delete-account")]
    DeleteAccount {
        /// Account name.
        user: String,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Generate a random password instead of taking a value.
    #[arg(long, conflicts_with = "value")]
    generate: bool,

    /// Length of the generated password (4-128).
    #[arg(long, default_value_t = generate::DEFAULT_LENGTH)]
    length: usize,

    /// Character classes of the generated password.
    #[arg(long, value_enum, default_value_t = Charset::Full)]
    charset: Charset,
}

impl GenerateArgs {
    /// The secret to seal: generated, given, or prompted for.
    fn secret(&self, value: Option<String>) -> Result<SecretBytes> {
        if self.generate {
            generate::password(self.length, self.charset)
        } else {
            prompt::secret_value(value)
        }
    }

    fn describe(&self) -> String {
        if self.generate {
            format!(" (generated, {} characters)", self.length)
        } else {
            String::new()
        }
    }
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}{BOLD}✗ Error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = VaultConfig::from_env().context("invalid vault configuration")?;
    let backend = storage::open(cli.storage, &cli.path)?;
    debug!(storage = ?cli.storage, path = %cli.path, "storage opened");
    let vault = Vault::from_config(BackendRecordStore::new(backend), &config)
        .context("invalid password hashing parameters")?;

    match cli.command {
        Commands::Register { user } => cmd_register(&vault, &user).await,
        Commands::Verify { user } => cmd_verify(&vault, &user).await,
        Commands::Put {
            user,
            label,
            value,
            generator,
        } => cmd_put(&vault, &user, &label, value, &generator).await,
        Commands::Get { user, label } => cmd_get(&vault, &user, &label).await,
        Commands::Update {
            user,
            label,
            value,
            generator,
        } => cmd_update(&vault, &user, &label, value, &generator).await,
        Commands::Rm { user, label } => cmd_rm(&vault, &user, &label).await,
        Commands::List { user } => cmd_list(&vault, &user).await,
        Commands::DeleteAccount { user } => cmd_delete_account(&vault, &user).await,
    }
}

type CliVault = Vault<BackendRecordStore>;

async fn login(vault: &CliVault, user: &str) -> Result<lockbox_core::Session> {
    let password = prompt::master_password()?;
    vault
        .login(user, password.expose())
        .await
        .with_context(|| format!("login failed for '{user}'"))
}

// ── Account commands ─────────────────────────────────────────────────

async fn cmd_register(vault: &CliVault, user: &str) -> Result<()> {
    let password = prompt::new_master_password()?;
    vault
        .register(user, password.expose())
        .await
        .context("registration failed")?;
    success(&format!("Registered '{user}'"));
    Ok(())
}

async fn cmd_verify(vault: &CliVault, user: &str) -> Result<()> {
    login(vault, user).await?;
    success("Master password accepted");
    Ok(())
}

async fn cmd_delete_account(vault: &CliVault, user: &str) -> Result<()> {
    let password = prompt::master_password()?;
    vault
        .delete_account(user, password.expose())
        .await
        .with_context(|| format!("failed to delete account '{user}'"))?;
    success(&format!("Deleted account '{user}' and all of its secrets"));
    Ok(())
}

// ── Secret commands ──────────────────────────────────────────────────

async fn cmd_put(
    vault: &CliVault,
    user: &str,
    label: &str,
    value: Option<String>,
    generator: &GenerateArgs,
) -> Result<()> {
    let session = login(vault, user).await?;
    let secret = generator.secret(value)?;
    vault
        .store_secret(&session, label, secret.expose())
        .await
        .context("failed to store secret")?;
    success(&format!("Stored '{label}'{}", generator.describe()));
    Ok(())
}

async fn cmd_get(vault: &CliVault, user: &str, label: &str) -> Result<()> {
    let session = login(vault, user).await?;
    let secret = vault
        .retrieve_secret(&session, label)
        .await
        .context("failed to retrieve secret")?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(secret.expose())
        .and_then(|()| stdout.write_all(b"\n"))
        .and_then(|()| stdout.flush())
        .context("failed to write secret to stdout")
}

async fn cmd_update(
    vault: &CliVault,
    user: &str,
    label: &str,
    value: Option<String>,
    generator: &GenerateArgs,
) -> Result<()> {
    let session = login(vault, user).await?;
    let secret = generator.secret(value)?;
    vault
        .update_secret(&session, label, secret.expose())
        .await
        .context("failed to update secret")?;
    success(&format!("Updated '{label}'{}", generator.describe()));
    Ok(())
}

async fn cmd_rm(vault: &CliVault, user: &str, label: &str) -> Result<()> {
    let session = login(vault, user).await?;
    vault
        .delete_secret(&session, label)
        .await
        .context("failed to delete secret")?;
    success(&format!("Deleted '{label}'"));
    Ok(())
}

async fn cmd_list(vault: &CliVault, user: &str) -> Result<()> {
    let session = login(vault, user).await?;
    let labels = vault
        .list_labels(&session)
        .await
        .context("failed to list secrets")?;
    if labels.is_empty() {
        println!("{DIM}(no secrets){RESET}");
    }
    for label in labels {
        println!("{label}");
    }
    Ok(())
}
