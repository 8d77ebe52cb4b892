//! Vault state machine.
//!
//! A [`Vault`] owns a store, the current credential and, while unlocked, the
//! session key. Every path that ends a session (explicit lock, inactivity
//! timeout, codec failure, password removal) goes through
//! `transition_to_locked`.
//!
//! ```text
//!               set_password               unlock
//! NoPassword ────────────────▶ Locked ◀──────────────▶ Unlocked
//!     ▲                          │    lock / timeout /      │
//!     │      remove_password     │    codec failure         │
//!     └──────────────────────────┴──────────────────────────┘
//! ```

pub mod credential;
#[cfg(feature = "async")]
pub mod handle;
pub mod key_manager;
pub mod password;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::VaultConfig;
use crate::crypto::{CryptoError, SessionKey};
use crate::entry::{
    EntryDecryptionError, EntryEncryptionError, EntryId, EntryRecord, EntrySummary, VaultEntry,
};
use crate::store::{StoreError, VaultStore};

pub use credential::{CREDENTIAL_VERSION, VaultCredential};
pub use key_manager::{KeyManager, KeyManagerError, KeyRotation};
pub use password::{PasswordPolicy, WeakPasswordReason};

/// Shown to the user before a password is set.
pub const IRRECOVERABLE_LOSS_WARNING: &str = "There is no password recovery. If you forget this \
password, every entry in the vault becomes permanently unreadable.";

/// Where the vault is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No credential stored; entries cannot be created.
    NoPassword,
    /// Credential stored, no key in memory.
    Locked,
    /// Key in memory; entries can be read and written.
    Unlocked,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Explicit,
    InactivityTimeout,
    /// Encryption or key access failed while unlocked.
    CodecFailure,
    /// An unlock attempt on an already unlocked vault failed.
    UnlockFailed,
    PasswordRemoved,
}

/// Errors surfaced to callers of the vault.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Password too weak: {0}")]
    WeakPassword(#[from] WeakPasswordReason),

    #[error("Incorrect password")]
    IncorrectPassword,

    /// One entry failed to decrypt. The vault stays unlocked unless key access failed.
    #[error(transparent)]
    DecryptionFailure(EntryDecryptionError),

    #[error("A password is already set for this vault")]
    AlreadyExists,

    #[error("Vault is locked")]
    Locked,

    #[error("Vault has no password set")]
    NoPassword,

    #[error("Entry not found: {id}")]
    EntryNotFound { id: EntryId },

    /// Sealing failed; the vault has been locked.
    #[error(transparent)]
    Encryption(#[from] EntryEncryptionError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<KeyManagerError> for VaultError {
    fn from(err: KeyManagerError) -> Self {
        match err {
            KeyManagerError::WeakPassword(reason) => VaultError::WeakPassword(reason),
            KeyManagerError::IncorrectPassword => VaultError::IncorrectPassword,
            KeyManagerError::Crypto(e) => VaultError::Crypto(e),
        }
    }
}

/// Key material for one unlocked period.
struct Session {
    key: Arc<SessionKey>,
    last_activity: Instant,
}

/// A password-protected collection of encrypted entries.
pub struct Vault<S: VaultStore> {
    store: S,
    config: VaultConfig,
    key_manager: KeyManager,
    credential: Option<VaultCredential>,
    session: Option<Session>,
}

impl<S: VaultStore> std::fmt::Debug for Vault<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("has_credential", &self.credential.is_some())
            .field("unlocked", &self.session.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: VaultStore> Vault<S> {
    /// Open a vault over `store`.
    ///
    /// Starts in `NoPassword` when the store holds no credential, otherwise
    /// in `Locked`.
    #[instrument(level = "debug", skip_all)]
    pub fn open(store: S, config: VaultConfig) -> Result<Self, VaultError> {
        let credential = store.load_credential()?;
        debug!(has_credential = credential.is_some(), "Vault opened");
        Ok(Self {
            store,
            key_manager: KeyManager::new(config.password_policy, config.kdf),
            config,
            credential,
            session: None,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn key_manager(&self) -> &KeyManager {
        &self.key_manager
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct store access. Writes made here bypass the vault's checks.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Stored credential, if any.
    pub fn credential(&self) -> Option<&VaultCredential> {
        self.credential.as_ref()
    }

    /// Current state, after applying the inactivity timeout.
    pub fn state(&mut self) -> VaultState {
        self.enforce_timeout();
        self.peek_state()
    }

    pub fn is_unlocked(&mut self) -> bool {
        self.state() == VaultState::Unlocked
    }

    /// Instant at which the current session expires, if unlocked.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.session
            .as_ref()
            .map(|s| s.last_activity + self.config.inactivity_timeout)
    }

    fn peek_state(&self) -> VaultState {
        match (&self.credential, &self.session) {
            (None, _) => VaultState::NoPassword,
            (Some(_), None) => VaultState::Locked,
            (Some(_), Some(_)) => VaultState::Unlocked,
        }
    }

    /// Create the credential for a vault that has none.
    ///
    /// Callers should show [`IRRECOVERABLE_LOSS_WARNING`] first. With
    /// `unlock_on_create` (the default) the vault ends `Unlocked`, otherwise
    /// `Locked`.
    ///
    /// # Errors
    ///
    /// - `VaultError::AlreadyExists`: a credential is already stored
    /// - `VaultError::WeakPassword`: the password fails the policy
    #[instrument(level = "info", skip_all)]
    pub fn set_password(&mut self, password: &str) -> Result<(), VaultError> {
        if self.credential.is_some() {
            return Err(VaultError::AlreadyExists);
        }
        let (credential, key) = self.key_manager.set_password(password)?;
        self.install_credential(credential, key)
    }

    /// Persist a freshly created credential and, if configured, open a session.
    pub(crate) fn install_credential(
        &mut self,
        credential: VaultCredential,
        key: SessionKey,
    ) -> Result<(), VaultError> {
        if self.credential.is_some() {
            return Err(VaultError::AlreadyExists);
        }
        self.store.save_credential(&credential)?;
        self.credential = Some(credential);
        info!("Vault password set");

        if self.config.unlock_on_create {
            self.install_session(key);
        }
        Ok(())
    }

    /// Verify `password` and open a session.
    ///
    /// On failure no key is installed and the vault is `Locked` (or stays in
    /// `NoPassword`). The error is always `IncorrectPassword`.
    #[instrument(level = "info", skip_all)]
    pub fn unlock(&mut self, password: &str) -> Result<(), VaultError> {
        self.enforce_timeout();
        let Some(credential) = &self.credential else {
            return Err(VaultError::IncorrectPassword);
        };

        match self.key_manager.verify_password(password, credential) {
            Ok(key) => {
                self.install_session(key);
                info!("Vault unlocked");
                Ok(())
            }
            Err(e) => {
                warn!("Unlock attempt failed");
                self.transition_to_locked(LockReason::UnlockFailed);
                Err(e.into())
            }
        }
    }

    /// Install a key verified elsewhere, provided the credential it was
    /// verified against is still the stored one.
    pub(crate) fn install_verified_key(
        &mut self,
        verified_against: &VaultCredential,
        key: SessionKey,
    ) -> Result<(), VaultError> {
        if self.credential.as_ref() != Some(verified_against) {
            debug!("Credential changed during derivation, discarding key");
            return Err(VaultError::IncorrectPassword);
        }
        self.install_session(key);
        info!("Vault unlocked");
        Ok(())
    }

    fn install_session(&mut self, key: SessionKey) {
        self.session = Some(Session {
            key: Arc::new(key),
            last_activity: Instant::now(),
        });
    }

    /// Explicitly end the session.
    pub fn lock(&mut self) {
        self.transition_to_locked(LockReason::Explicit);
    }

    /// The single path that ends a session.
    ///
    /// Drops the vault's reference to the key; operations still holding an
    /// `Arc` finish with it and the key is wiped when the last one drops.
    pub(crate) fn transition_to_locked(&mut self, reason: LockReason) {
        if self.session.take().is_some() {
            info!(?reason, "Vault locked");
        }
    }

    fn enforce_timeout(&mut self) {
        let expired = self
            .session
            .as_ref()
            .is_some_and(|s| s.last_activity.elapsed() >= self.config.inactivity_timeout);
        if expired {
            self.transition_to_locked(LockReason::InactivityTimeout);
        }
    }

    /// Time left before the session expires.
    pub fn time_until_lock(&mut self) -> Option<Duration> {
        self.enforce_timeout();
        self.idle_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Key for one operation; resets the inactivity timer.
    fn session_key(&mut self) -> Result<Arc<SessionKey>, VaultError> {
        self.enforce_timeout();
        match self.peek_state() {
            VaultState::NoPassword => Err(VaultError::NoPassword),
            VaultState::Locked => Err(VaultError::Locked),
            VaultState::Unlocked => {
                let session = self.session.as_mut().ok_or(VaultError::Locked)?;
                session.last_activity = Instant::now();
                Ok(Arc::clone(&session.key))
            }
        }
    }

    fn touch(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.last_activity = Instant::now();
        }
    }

    fn lookup(&self, id: &EntryId) -> Result<EntryRecord, VaultError> {
        self.store
            .load_entry(id)?
            .ok_or_else(|| VaultError::EntryNotFound { id: id.clone() })
    }

    fn seal(
        &mut self,
        id: EntryId,
        title: &str,
        content: &str,
        created_at: DateTime<Utc>,
        key: &SessionKey,
    ) -> Result<EntryRecord, VaultError> {
        EntryRecord::seal(id, title, content, created_at, self.config.title_policy, key).map_err(
            |e| {
                warn!(error = %e, "Sealing failed, locking vault");
                self.transition_to_locked(LockReason::CodecFailure);
                VaultError::Encryption(e)
            },
        )
    }

    /// Encrypt and store a new entry.
    #[instrument(level = "debug", skip_all)]
    pub fn save_entry(&mut self, title: &str, content: &str) -> Result<EntryRecord, VaultError> {
        let key = self.session_key()?;
        let record = self.seal(EntryId::random(), title, content, Utc::now(), &key)?;
        self.store.save_entry(&record)?;
        debug!(entry_id = %record.id, "Entry saved");
        Ok(record)
    }

    /// Re-encrypt an existing entry with new title and content.
    ///
    /// Keeps the id and creation time. A fresh nonce is used.
    #[instrument(level = "debug", skip(self, title, content), fields(entry_id = %id))]
    pub fn update_entry(
        &mut self,
        id: &EntryId,
        title: &str,
        content: &str,
    ) -> Result<EntryRecord, VaultError> {
        self.enforce_timeout();
        let existing = self.lookup(id)?;
        let key = self.session_key()?;
        let record = self.seal(id.clone(), title, content, existing.created_at, &key)?;
        self.store.save_entry(&record)?;
        debug!("Entry updated");
        Ok(record)
    }

    /// Load and decrypt one entry.
    #[instrument(level = "debug", skip(self), fields(entry_id = %id))]
    pub fn read_entry(&mut self, id: &EntryId) -> Result<VaultEntry, VaultError> {
        self.enforce_timeout();
        let record = self.lookup(id)?;
        self.open_record(&record)
    }

    /// Decrypt a record the caller already holds.
    ///
    /// An authentication failure affects only this entry. A key access
    /// failure locks the vault.
    pub fn open_record(&mut self, record: &EntryRecord) -> Result<VaultEntry, VaultError> {
        let key = self.session_key()?;
        record.open(&key).map_err(|e| {
            if matches!(e, EntryDecryptionError::KeyAccess(_)) {
                warn!(error = %e, "Key access failed, locking vault");
                self.transition_to_locked(LockReason::CodecFailure);
            } else {
                warn!(entry_id = %record.id, error = %e, "Entry failed to decrypt");
            }
            VaultError::DecryptionFailure(e)
        })
    }

    /// Delete one entry. Requires an unlocked vault.
    #[instrument(level = "debug", skip(self), fields(entry_id = %id))]
    pub fn delete_entry(&mut self, id: &EntryId) -> Result<(), VaultError> {
        self.enforce_timeout();
        self.lookup(id)?;
        self.session_key()?;
        if !self.store.delete_entry(id)? {
            return Err(VaultError::EntryNotFound { id: id.clone() });
        }
        debug!("Entry deleted");
        Ok(())
    }

    /// Metadata of every entry, newest first. Works while locked.
    pub fn list_entries(&mut self) -> Result<Vec<EntrySummary>, VaultError> {
        self.enforce_timeout();
        self.touch();
        let mut summaries: Vec<EntrySummary> = self
            .store
            .list_entries()?
            .iter()
            .map(EntrySummary::from)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// Replace the password, re-encrypting every entry under the new key.
    ///
    /// All entries are decrypted before anything is written. If any entry
    /// fails, nothing changes. The new credential and entries are written
    /// in one store call. An unlocked vault stays unlocked under the new key.
    ///
    /// # Errors
    ///
    /// - `VaultError::NoPassword`: nothing to change
    /// - `VaultError::IncorrectPassword`: `old_password` did not verify
    /// - `VaultError::WeakPassword`: `new_password` fails the policy
    /// - `VaultError::DecryptionFailure`: an entry could not be decrypted
    #[instrument(level = "info", skip_all)]
    pub fn change_password(
        &mut self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), VaultError> {
        self.enforce_timeout();
        let credential = self.credential.as_ref().ok_or(VaultError::NoPassword)?;
        let rotation = self
            .key_manager
            .change_password(old_password, new_password, credential)?;
        self.apply_rotation(rotation)
    }

    /// Apply a rotation derived elsewhere, provided the credential it was
    /// derived against is still the stored one.
    pub(crate) fn finish_rotation(
        &mut self,
        derived_against: &VaultCredential,
        rotation: KeyRotation,
    ) -> Result<(), VaultError> {
        self.enforce_timeout();
        if self.credential.as_ref() != Some(derived_against) {
            debug!("Credential changed during derivation, discarding rotation");
            return Err(VaultError::IncorrectPassword);
        }
        self.apply_rotation(rotation)
    }

    /// Re-encrypt every entry from the old key to the new one and persist
    /// them with the new credential.
    fn apply_rotation(&mut self, rotation: KeyRotation) -> Result<(), VaultError> {
        let records = self.store.list_entries()?;
        let mut resealed = Vec::with_capacity(records.len());
        for record in &records {
            let entry = record.open(&rotation.old_key).map_err(|e| {
                warn!(entry_id = %record.id, error = %e, "Aborting password change");
                VaultError::DecryptionFailure(e)
            })?;
            resealed.push(EntryRecord::seal_at(
                record.id.clone(),
                &entry.title,
                &entry.content,
                record.created_at,
                record.updated_at,
                self.config.title_policy,
                &rotation.new_key,
            )?);
        }

        self.store.replace_all(&rotation.credential, &resealed)?;
        self.credential = Some(rotation.credential);
        if self.session.is_some() {
            self.install_session(rotation.new_key);
        }
        info!(entries = resealed.len(), "Vault password changed");
        Ok(())
    }

    /// Delete the credential and every entry, after re-verifying `password`.
    ///
    /// Verification is required even when unlocked. The vault ends in
    /// `NoPassword`.
    #[instrument(level = "info", skip_all)]
    pub fn remove_password(&mut self, password: &str) -> Result<(), VaultError> {
        self.enforce_timeout();
        let credential = self.credential.as_ref().ok_or(VaultError::NoPassword)?;
        self.key_manager.verify_password(password, credential)?;
        self.purge()
    }

    /// Purge after a password verified elsewhere, provided the credential it
    /// was verified against is still the stored one.
    pub(crate) fn finish_removal(
        &mut self,
        verified_against: &VaultCredential,
    ) -> Result<(), VaultError> {
        self.enforce_timeout();
        if self.credential.as_ref() != Some(verified_against) {
            debug!("Credential changed during verification, keeping vault");
            return Err(VaultError::IncorrectPassword);
        }
        self.purge()
    }

    fn purge(&mut self) -> Result<(), VaultError> {
        self.store.purge()?;
        self.credential = None;
        self.transition_to_locked(LockReason::PasswordRemoved);
        info!("Vault password removed, all entries deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use crate::store::MemoryStore;

    const PASSWORD: &str = "Tr0ub4dor&3";

    fn config() -> VaultConfig {
        VaultConfig::default().with_kdf(KdfParams {
            log2_n: 10,
            r: 8,
            p: 1,
        })
    }

    fn unlocked_vault() -> Vault<MemoryStore> {
        let mut vault = Vault::open(MemoryStore::new(), config()).unwrap();
        vault.set_password(PASSWORD).unwrap();
        vault
    }

    #[test]
    fn test_initial_state() {
        let mut vault = Vault::open(MemoryStore::new(), config()).unwrap();
        assert_eq!(vault.state(), VaultState::NoPassword);
        assert!(matches!(vault.save_entry("a", "b"), Err(VaultError::NoPassword)));
    }

    #[test]
    fn test_set_password_twice() {
        let mut vault = unlocked_vault();
        assert!(matches!(
            vault.set_password("An0ther!Pass"),
            Err(VaultError::AlreadyExists)
        ));
    }

    #[test]
    fn test_set_password_without_auto_unlock() {
        let mut vault =
            Vault::open(MemoryStore::new(), config().with_unlock_on_create(false)).unwrap();
        vault.set_password(PASSWORD).unwrap();
        assert_eq!(vault.state(), VaultState::Locked);
    }

    #[test]
    fn test_unlock_without_password() {
        let mut vault = Vault::open(MemoryStore::new(), config()).unwrap();
        assert!(matches!(
            vault.unlock(PASSWORD),
            Err(VaultError::IncorrectPassword)
        ));
        assert_eq!(vault.state(), VaultState::NoPassword);
    }

    #[test]
    fn test_failed_unlock_while_unlocked_locks() {
        let mut vault = unlocked_vault();
        assert!(vault.unlock("wrong").is_err());
        assert_eq!(vault.state(), VaultState::Locked);
        assert!(vault.idle_deadline().is_none());
    }

    #[test]
    fn test_in_flight_key_survives_lock() {
        let mut vault = unlocked_vault();
        let record = vault.save_entry("Note", "hello").unwrap();
        let key = vault.session_key().unwrap();
        vault.lock();
        assert_eq!(record.open(&key).unwrap().content.as_str(), "hello");
        assert_eq!(Arc::strong_count(&key), 1);
    }

    #[test]
    fn test_tampered_entry_does_not_lock() {
        let mut vault = unlocked_vault();
        let good = vault.save_entry("Good", "fine").unwrap();
        let bad = vault.save_entry("Bad", "broken").unwrap();
        vault.store_mut().entry_mut(&bad.id).unwrap().tag[0] ^= 0x01;

        assert!(matches!(
            vault.read_entry(&bad.id),
            Err(VaultError::DecryptionFailure(
                EntryDecryptionError::Authentication { .. }
            ))
        ));
        assert_eq!(vault.state(), VaultState::Unlocked);
        assert_eq!(vault.read_entry(&good.id).unwrap().content.as_str(), "fine");
    }

    #[test]
    fn test_missing_entry_is_not_found_even_when_locked() {
        let mut vault = unlocked_vault();
        vault.lock();
        let id = EntryId::from("does-not-exist");
        assert!(matches!(
            vault.read_entry(&id),
            Err(VaultError::EntryNotFound { .. })
        ));
        assert!(matches!(
            vault.delete_entry(&id),
            Err(VaultError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_requires_unlock() {
        let mut vault = unlocked_vault();
        let record = vault.save_entry("Note", "x").unwrap();
        vault.lock();
        assert!(matches!(vault.delete_entry(&record.id), Err(VaultError::Locked)));
        vault.unlock(PASSWORD).unwrap();
        vault.delete_entry(&record.id).unwrap();
        assert!(vault.store().is_empty());
    }

    #[test]
    fn test_update_keeps_created_at() {
        let mut vault = unlocked_vault();
        let original = vault.save_entry("Note", "v1").unwrap();
        let updated = vault.update_entry(&original.id, "Note", "v2").unwrap();
        assert_eq!(updated.created_at, original.created_at);
        assert_ne!(updated.iv, original.iv);
        assert_eq!(vault.read_entry(&original.id).unwrap().content.as_str(), "v2");
    }

    #[test]
    fn test_list_entries_while_locked() {
        let mut vault = unlocked_vault();
        vault.save_entry("First", "1").unwrap();
        vault.save_entry("Second", "2").unwrap();
        vault.lock();
        let summaries = vault.list_entries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.title.is_some()));
    }

    #[test]
    fn test_change_password_aborts_on_bad_entry() {
        let mut vault = unlocked_vault();
        let bad = vault.save_entry("Bad", "broken").unwrap();
        vault.store_mut().entry_mut(&bad.id).unwrap().ciphertext[0] ^= 0xFF;
        let before = vault.credential().cloned();

        let result = vault.change_password(PASSWORD, "N3w!Passphrase");
        assert!(matches!(result, Err(VaultError::DecryptionFailure(_))));
        assert_eq!(vault.credential().cloned(), before);

        vault.lock();
        vault.unlock(PASSWORD).unwrap();
    }

    #[test]
    fn test_remove_password_requires_fresh_verification() {
        let mut vault = unlocked_vault();
        assert!(matches!(
            vault.remove_password("nope"),
            Err(VaultError::IncorrectPassword)
        ));
        assert_eq!(vault.state(), VaultState::Unlocked);
    }
}
