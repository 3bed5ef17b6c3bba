//! Vault session service: accounts and labelled secrets for one owner at a
//! time.
//!
//! A [`Vault`] ties the record store, the master authenticator and the
//! envelope engine together. Logging in yields a [`Session`] holding the
//! verified master password; every secret operation takes the session, so a
//! caller cannot reach envelopes without first proving the password.

use tracing::{debug, info};

use crate::auth::MasterAuthenticator;
use crate::config::VaultConfig;
use crate::envelope::EnvelopeEngine;
use crate::error::{AuthError, VaultError};
use crate::secret::SecretBytes;
use crate::store::RecordStore;

/// An authenticated owner. The master password is wiped when the session
/// is dropped.
#[derive(Debug)]
pub struct Session {
    username: String,
    master: SecretBytes,
}

impl Session {
    /// The authenticated username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Accounts and secrets over a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct Vault<S> {
    store: S,
    auth: MasterAuthenticator,
    engine: EnvelopeEngine,
}

impl<S: RecordStore> Vault<S> {
    #[must_use]
    pub fn new(store: S, auth: MasterAuthenticator, engine: EnvelopeEngine) -> Self {
        Self {
            store,
            auth,
            engine,
        }
    }

    /// Build a vault with the engine and authenticator described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidParams`] if the Argon2 settings are rejected.
    pub fn from_config(store: S, config: &VaultConfig) -> Result<Self, AuthError> {
        Ok(Self::new(store, config.authenticator()?, config.engine()))
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a new account.
    ///
    /// # Errors
    ///
    /// See [`MasterAuthenticator::register`].
    pub async fn register(&self, username: &str, password: &[u8]) -> Result<(), VaultError> {
        self.auth.register(&self.store, username, password).await?;
        Ok(())
    }

    /// Verify `password` and open a session for `username`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] (as [`VaultError::Auth`]) for an unknown user.
    /// - [`VaultError::AuthenticationFailed`] for a wrong password.
    pub async fn login(&self, username: &str, password: &[u8]) -> Result<Session, VaultError> {
        if !self.auth.verify(&self.store, username, password).await? {
            debug!(username = %username, "master password rejected");
            return Err(VaultError::AuthenticationFailed);
        }
        debug!(username = %username, "session opened");
        Ok(Session {
            username: username.to_owned(),
            master: SecretBytes::from(password),
        })
    }

    /// Seal `plaintext` and store it under a new `label`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::LabelExists`] if the label is already in use.
    /// - [`VaultError::Crypto`] if the OS CSPRNG fails.
    /// - [`VaultError::Store`] if the record store fails.
    pub async fn store_secret(
        &self,
        session: &Session,
        label: &str,
        plaintext: &[u8],
    ) -> Result<(), VaultError> {
        let envelope = self.engine.seal(plaintext, session.master.expose())?;
        if !self
            .store
            .insert_envelope(&session.username, label, &envelope)
            .await?
        {
            return Err(VaultError::LabelExists {
                label: label.to_owned(),
            });
        }
        info!(username = %session.username, label = %label, "secret stored");
        Ok(())
    }

    /// Open the secret stored under `label`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::SecretNotFound`] if there is no such label.
    /// - [`VaultError::Crypto`] if the envelope cannot be opened.
    /// - [`VaultError::Store`] if the record store fails.
    pub async fn retrieve_secret(
        &self,
        session: &Session,
        label: &str,
    ) -> Result<SecretBytes, VaultError> {
        let envelope = self
            .store
            .get_envelope(&session.username, label)
            .await?
            .ok_or_else(|| VaultError::SecretNotFound {
                label: label.to_owned(),
            })?;
        Ok(self.engine.open(&envelope, session.master.expose())?)
    }

    /// Replace the secret under an existing `label` with a freshly sealed
    /// envelope.
    ///
    /// # Errors
    ///
    /// - [`VaultError::SecretNotFound`] if there is no such label.
    /// - [`VaultError::Crypto`] if the OS CSPRNG fails.
    /// - [`VaultError::Store`] if the record store fails.
    pub async fn update_secret(
        &self,
        session: &Session,
        label: &str,
        plaintext: &[u8],
    ) -> Result<(), VaultError> {
        let envelope = self.engine.seal(plaintext, session.master.expose())?;
        if !self
            .store
            .replace_envelope(&session.username, label, &envelope)
            .await?
        {
            return Err(VaultError::SecretNotFound {
                label: label.to_owned(),
            });
        }
        info!(username = %session.username, label = %label, "secret updated");
        Ok(())
    }

    /// Delete the secret under `label`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::SecretNotFound`] if there is no such label.
    /// - [`VaultError::Store`] if the record store fails.
    pub async fn delete_secret(&self, session: &Session, label: &str) -> Result<(), VaultError> {
        self.require_label(session, label).await?;
        self.store
            .delete_envelope(&session.username, label)
            .await?;
        info!(username = %session.username, label = %label, "secret deleted");
        Ok(())
    }

    /// Labels owned by the session's user, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the record store fails.
    pub async fn list_labels(&self, session: &Session) -> Result<Vec<String>, VaultError> {
        Ok(self.store.list_labels(&session.username).await?)
    }

    /// Re-verify `password`, then remove the account and all its secrets.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] (as [`VaultError::Auth`]) for an unknown user.
    /// - [`VaultError::AuthenticationFailed`] for a wrong password.
    /// - [`VaultError::Store`] if the record store fails.
    pub async fn delete_account(&self, username: &str, password: &[u8]) -> Result<(), VaultError> {
        if !self.auth.verify(&self.store, username, password).await? {
            return Err(VaultError::AuthenticationFailed);
        }
        self.auth.remove(&self.store, username).await?;
        info!(username = %username, "account deleted");
        Ok(())
    }

    async fn require_label(&self, session: &Session, label: &str) -> Result<(), VaultError> {
        match self.store.get_envelope(&session.username, label).await? {
            Some(_) => Ok(()),
            None => Err(VaultError::SecretNotFound {
                label: label.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::Arc;

    use lockbox_storage::{MemoryBackend, StorageBackend};

    use super::*;
    use crate::auth::HashParams;
    use crate::error::{CryptoError, StoreError};
    use crate::store::BackendRecordStore;

    fn test_vault() -> Vault<BackendRecordStore> {
        let store =
            BackendRecordStore::new(Arc::new(MemoryBackend::new()) as Arc<dyn StorageBackend>);
        let auth = MasterAuthenticator::new(HashParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        Vault::new(store, auth, EnvelopeEngine::new(NonZeroU32::new(1_000).unwrap()))
    }

    async fn logged_in(vault: &Vault<BackendRecordStore>) -> Session {
        vault.register("alice", b"CorrectHorse1").await.unwrap();
        vault.login("alice", b"CorrectHorse1").await.unwrap()
    }

    #[tokio::test]
    async fn login_outcomes() {
        let vault = test_vault();
        vault.register("alice", b"CorrectHorse1").await.unwrap();

        let session = vault.login("alice", b"CorrectHorse1").await.unwrap();
        assert_eq!(session.username(), "alice");

        assert!(matches!(
            vault.login("alice", b"CorrectHorse2").await,
            Err(VaultError::AuthenticationFailed)
        ));
        assert!(matches!(
            vault.login("bob", b"anything").await,
            Err(VaultError::Auth(AuthError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn session_debug_hides_password() {
        let vault = test_vault();
        let session = logged_in(&vault).await;
        let debug = format!("{session:?}");
        assert!(!debug.contains("CorrectHorse1"));
    }

    #[tokio::test]
    async fn store_and_retrieve() {
        let vault = test_vault();
        let session = logged_in(&vault).await;

        vault
            .store_secret(&session, "github", b"sup3rSecret!")
            .await
            .unwrap();
        let secret = vault.retrieve_secret(&session, "github").await.unwrap();
        assert_eq!(secret.expose(), b"sup3rSecret!");
    }

    #[tokio::test]
    async fn duplicate_label_is_rejected() {
        let vault = test_vault();
        let session = logged_in(&vault).await;
        vault.store_secret(&session, "github", b"one").await.unwrap();
        assert!(matches!(
            vault.store_secret(&session, "github", b"two").await,
            Err(VaultError::LabelExists { .. })
        ));
        let secret = vault.retrieve_secret(&session, "github").await.unwrap();
        assert_eq!(secret.expose(), b"one");
    }

    #[tokio::test]
    async fn racing_stores_of_one_label_keep_the_winner() {
        let vault = test_vault();
        let session = logged_in(&vault).await;

        let (first, second) = tokio::join!(
            vault.store_secret(&session, "github", b"first"),
            vault.store_secret(&session, "github", b"second"),
        );
        let winner: &[u8] = match (first, second) {
            (Ok(()), Err(VaultError::LabelExists { .. })) => b"first",
            (Err(VaultError::LabelExists { .. }), Ok(())) => b"second",
            other => panic!("expected exactly one store to win, got {other:?}"),
        };
        let secret = vault.retrieve_secret(&session, "github").await.unwrap();
        assert_eq!(secret.expose(), winner);
    }

    #[tokio::test]
    async fn stale_session_cannot_write_after_account_deletion() {
        let vault = test_vault();
        let session = logged_in(&vault).await;
        vault.delete_account("alice", b"CorrectHorse1").await.unwrap();

        assert!(matches!(
            vault.store_secret(&session, "github", b"x").await,
            Err(VaultError::Store(StoreError::MissingOwner { .. }))
        ));
        assert!(vault.store().list_labels("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_label_operations() {
        let vault = test_vault();
        let session = logged_in(&vault).await;
        assert!(matches!(
            vault.retrieve_secret(&session, "nope").await,
            Err(VaultError::SecretNotFound { .. })
        ));
        assert!(matches!(
            vault.update_secret(&session, "nope", b"x").await,
            Err(VaultError::SecretNotFound { .. })
        ));
        assert!(matches!(
            vault.delete_secret(&session, "nope").await,
            Err(VaultError::SecretNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_reseals_with_fresh_salt_and_iv() {
        let vault = test_vault();
        let session = logged_in(&vault).await;
        vault.store_secret(&session, "email", b"old").await.unwrap();
        let before = vault
            .store()
            .get_envelope("alice", "email")
            .await
            .unwrap()
            .unwrap();

        vault.update_secret(&session, "email", b"new").await.unwrap();
        let after = vault
            .store()
            .get_envelope("alice", "email")
            .await
            .unwrap()
            .unwrap();

        assert_ne!(before.salt, after.salt);
        assert_ne!(before.iv, after.iv);
        let secret = vault.retrieve_secret(&session, "email").await.unwrap();
        assert_eq!(secret.expose(), b"new");
    }

    #[tokio::test]
    async fn delete_and_list() {
        let vault = test_vault();
        let session = logged_in(&vault).await;
        for label in ["zeta", "alpha", "mid"] {
            vault.store_secret(&session, label, b"v").await.unwrap();
        }
        assert_eq!(
            vault.list_labels(&session).await.unwrap(),
            vec!["alpha", "mid", "zeta"]
        );

        vault.delete_secret(&session, "mid").await.unwrap();
        assert_eq!(
            vault.list_labels(&session).await.unwrap(),
            vec!["alpha", "zeta"]
        );
    }

    #[tokio::test]
    async fn owners_are_isolated() {
        let vault = test_vault();
        let alice = logged_in(&vault).await;
        vault.register("bob", b"hunter2").await.unwrap();
        let bob = vault.login("bob", b"hunter2").await.unwrap();

        vault.store_secret(&alice, "github", b"alice-secret").await.unwrap();
        assert!(vault.list_labels(&bob).await.unwrap().is_empty());
        assert!(matches!(
            vault.retrieve_secret(&bob, "github").await,
            Err(VaultError::SecretNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_account_requires_password_and_cascades() {
        let vault = test_vault();
        let session = logged_in(&vault).await;
        vault.store_secret(&session, "github", b"x").await.unwrap();

        assert!(matches!(
            vault.delete_account("alice", b"wrong").await,
            Err(VaultError::AuthenticationFailed)
        ));
        assert_eq!(vault.list_labels(&session).await.unwrap(), vec!["github"]);

        vault.delete_account("alice", b"CorrectHorse1").await.unwrap();
        assert!(vault.list_labels(&session).await.unwrap().is_empty());
        assert!(matches!(
            vault.login("alice", b"CorrectHorse1").await,
            Err(VaultError::Auth(AuthError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn corrupted_envelope_fails_closed() {
        let vault = test_vault();
        let session = logged_in(&vault).await;
        vault.store_secret(&session, "github", b"secret").await.unwrap();

        let mut envelope = vault
            .store()
            .get_envelope("alice", "github")
            .await
            .unwrap()
            .unwrap();
        envelope.ciphertext.truncate(5);
        vault
            .store()
            .put_envelope("alice", "github", &envelope)
            .await
            .unwrap();

        assert!(matches!(
            vault.retrieve_secret(&session, "github").await,
            Err(VaultError::Crypto(CryptoError::DecryptionFailed))
        ));
    }
}
