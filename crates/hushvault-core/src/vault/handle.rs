//! Async surface for interactive front-ends.
//!
//! Password derivation is deliberately slow, so it runs on tokio's blocking
//! pool as a [`DerivationTask`] that the caller can poll, cancel, or await.
//! [`SharedVault`] wraps a [`Vault`] for concurrent use and can run a
//! background auto-lock timer.
//!
//! # Thread Safety
//!
//! `SharedVault` is `Clone`, `Send` and `Sync`; clones refer to the same vault.
//!
//! ```ignore
//! let shared = SharedVault::new(vault);
//! let _auto_lock = shared.spawn_auto_lock();
//! shared.unlock(SecretString::from(password)).await?;
//! let record = shared.save_entry("Note", "hello").await?;
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use super::{
    KeyManager, KeyManagerError, KeyRotation, LockReason, Vault, VaultCredential, VaultError,
    VaultState,
};
use crate::crypto::{CryptoError, SessionKey};
use crate::entry::{EntryId, EntryRecord, EntrySummary, VaultEntry};
use crate::store::VaultStore;

/// Longest the auto-lock task sleeps while the vault is locked.
const LOCKED_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest, so a zero timeout cannot spin on the vault mutex.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn locked_poll_interval(timeout: Duration) -> Duration {
    timeout.clamp(MIN_POLL_INTERVAL, LOCKED_POLL_INTERVAL)
}

/// A key derivation running off the async executor.
///
/// Dropping or cancelling the task discards its result. A derivation that has
/// already started runs to completion on the blocking pool; the derived key,
/// if any, is wiped as soon as it returns.
#[derive(Debug)]
pub struct DerivationTask<T> {
    handle: JoinHandle<Result<T, KeyManagerError>>,
}

impl DerivationTask<SessionKey> {
    /// Verify `password` against `credential` in the background.
    pub fn verify(manager: KeyManager, password: SecretString, credential: VaultCredential) -> Self {
        Self::spawn(move || manager.verify_password(password.expose_secret(), &credential))
    }
}

impl DerivationTask<(VaultCredential, SessionKey)> {
    /// Create a credential for `password` in the background.
    pub fn create(manager: KeyManager, password: SecretString) -> Self {
        Self::spawn(move || manager.set_password(password.expose_secret()))
    }
}

impl DerivationTask<KeyRotation> {
    /// Verify `old_password` and create the replacement credential in the background.
    pub fn rotate(
        manager: KeyManager,
        old_password: SecretString,
        new_password: SecretString,
        credential: VaultCredential,
    ) -> Self {
        Self::spawn(move || {
            manager.change_password(
                old_password.expose_secret(),
                new_password.expose_secret(),
                &credential,
            )
        })
    }
}

impl<T: Send + 'static> DerivationTask<T> {
    fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, KeyManagerError> + Send + 'static,
    {
        Self {
            handle: tokio::task::spawn_blocking(f),
        }
    }

    /// Whether the derivation is still running.
    pub fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Abandon the derivation.
    ///
    /// Only the result is discarded: scrypt cannot be interrupted, so a
    /// derivation already running keeps its blocking thread until it finishes.
    pub fn cancel(self) {
        trace!("Derivation cancelled");
        self.handle.abort();
    }

    /// Wait for the derivation to finish.
    pub async fn wait(self) -> Result<T, VaultError> {
        match self.handle.await {
            Ok(result) => result.map_err(VaultError::from),
            Err(e) => Err(VaultError::Crypto(CryptoError::KeyDerivationFailed(
                format!("derivation task failed: {e}"),
            ))),
        }
    }
}

/// Cloneable, async-safe handle to a vault.
pub struct SharedVault<S: VaultStore> {
    inner: Arc<Mutex<Vault<S>>>,
}

impl<S: VaultStore> Clone for SharedVault<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: VaultStore> std::fmt::Debug for SharedVault<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedVault").finish_non_exhaustive()
    }
}

impl<S> SharedVault<S>
where
    S: VaultStore + Send + 'static,
{
    pub fn new(vault: Vault<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vault)),
        }
    }

    /// Run `f` with exclusive access to the vault.
    pub async fn with<R>(&self, f: impl FnOnce(&mut Vault<S>) -> R) -> R {
        let mut vault = self.inner.lock().await;
        f(&mut vault)
    }

    pub async fn state(&self) -> VaultState {
        self.inner.lock().await.state()
    }

    pub async fn lock(&self) {
        self.inner.lock().await.lock();
    }

    /// Start creating a credential without holding the vault.
    ///
    /// The policy is checked inside the task, so a weak password surfaces
    /// from [`DerivationTask::wait`].
    pub async fn begin_set_password(
        &self,
        password: SecretString,
    ) -> Result<DerivationTask<(VaultCredential, SessionKey)>, VaultError> {
        let mut vault = self.inner.lock().await;
        if vault.state() != VaultState::NoPassword {
            return Err(VaultError::AlreadyExists);
        }
        Ok(DerivationTask::create(vault.key_manager().clone(), password))
    }

    /// Create the credential; derivation runs off the vault mutex.
    #[instrument(level = "debug", skip_all)]
    pub async fn set_password(&self, password: SecretString) -> Result<(), VaultError> {
        let task = self.begin_set_password(password).await?;
        let (credential, key) = task.wait().await?;
        self.inner.lock().await.install_credential(credential, key)
    }

    /// Start verifying `password` without holding the vault.
    ///
    /// Other callers keep access to the vault while the task runs.
    pub async fn begin_unlock(
        &self,
        password: SecretString,
    ) -> Result<(DerivationTask<SessionKey>, VaultCredential), VaultError> {
        let mut vault = self.inner.lock().await;
        vault.state();
        let credential = vault
            .credential()
            .cloned()
            .ok_or(VaultError::IncorrectPassword)?;
        let task = DerivationTask::verify(vault.key_manager().clone(), password, credential.clone());
        Ok((task, credential))
    }

    /// Finish an unlock started with [`SharedVault::begin_unlock`].
    ///
    /// The key is installed only if the credential has not changed meanwhile.
    pub async fn finish_unlock(
        &self,
        task: DerivationTask<SessionKey>,
        verified_against: &VaultCredential,
    ) -> Result<(), VaultError> {
        match task.wait().await {
            Ok(key) => self
                .inner
                .lock()
                .await
                .install_verified_key(verified_against, key),
            Err(e) => {
                self.inner
                    .lock()
                    .await
                    .transition_to_locked(LockReason::UnlockFailed);
                Err(e)
            }
        }
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn unlock(&self, password: SecretString) -> Result<(), VaultError> {
        let (task, credential) = self.begin_unlock(password).await?;
        self.finish_unlock(task, &credential).await
    }

    /// Start a password change without holding the vault.
    ///
    /// Both derivations run in the task; the vault is only taken again by
    /// [`SharedVault::finish_change_password`] to re-encrypt and persist.
    pub async fn begin_change_password(
        &self,
        old_password: SecretString,
        new_password: SecretString,
    ) -> Result<(DerivationTask<KeyRotation>, VaultCredential), VaultError> {
        let mut vault = self.inner.lock().await;
        vault.state();
        let credential = vault.credential().cloned().ok_or(VaultError::NoPassword)?;
        let task = DerivationTask::rotate(
            vault.key_manager().clone(),
            old_password,
            new_password,
            credential.clone(),
        );
        Ok((task, credential))
    }

    /// Finish a change started with [`SharedVault::begin_change_password`].
    ///
    /// Nothing is written if the credential changed meanwhile.
    pub async fn finish_change_password(
        &self,
        task: DerivationTask<KeyRotation>,
        derived_against: &VaultCredential,
    ) -> Result<(), VaultError> {
        let rotation = task.wait().await?;
        self.inner
            .lock()
            .await
            .finish_rotation(derived_against, rotation)
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn change_password(
        &self,
        old_password: SecretString,
        new_password: SecretString,
    ) -> Result<(), VaultError> {
        let (task, credential) = self
            .begin_change_password(old_password, new_password)
            .await?;
        self.finish_change_password(task, &credential).await
    }

    /// Start verifying the password for removal without holding the vault.
    pub async fn begin_remove_password(
        &self,
        password: SecretString,
    ) -> Result<(DerivationTask<SessionKey>, VaultCredential), VaultError> {
        let mut vault = self.inner.lock().await;
        vault.state();
        let credential = vault.credential().cloned().ok_or(VaultError::NoPassword)?;
        let task = DerivationTask::verify(vault.key_manager().clone(), password, credential.clone());
        Ok((task, credential))
    }

    /// Finish a removal started with [`SharedVault::begin_remove_password`].
    pub async fn finish_remove_password(
        &self,
        task: DerivationTask<SessionKey>,
        verified_against: &VaultCredential,
    ) -> Result<(), VaultError> {
        drop(task.wait().await?);
        self.inner.lock().await.finish_removal(verified_against)
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn remove_password(&self, password: SecretString) -> Result<(), VaultError> {
        let (task, credential) = self.begin_remove_password(password).await?;
        self.finish_remove_password(task, &credential).await
    }

    pub async fn save_entry(&self, title: &str, content: &str) -> Result<EntryRecord, VaultError> {
        self.inner.lock().await.save_entry(title, content)
    }

    pub async fn update_entry(
        &self,
        id: &EntryId,
        title: &str,
        content: &str,
    ) -> Result<EntryRecord, VaultError> {
        self.inner.lock().await.update_entry(id, title, content)
    }

    pub async fn read_entry(&self, id: &EntryId) -> Result<VaultEntry, VaultError> {
        self.inner.lock().await.read_entry(id)
    }

    pub async fn delete_entry(&self, id: &EntryId) -> Result<(), VaultError> {
        self.inner.lock().await.delete_entry(id)
    }

    pub async fn list_entries(&self) -> Result<Vec<EntrySummary>, VaultError> {
        self.inner.lock().await.list_entries()
    }

    /// Start the background inactivity timer.
    ///
    /// The task sleeps until the session's idle deadline, then asks the vault
    /// for its state, which locks it through the usual transition if the
    /// deadline still holds. It ends when every `SharedVault` clone is
    /// dropped, or when the returned handle is dropped.
    pub fn spawn_auto_lock(&self) -> AutoLockTask {
        let weak: Weak<Mutex<Vault<S>>> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let wake_at = {
                    let mut vault = inner.lock().await;
                    vault.state();
                    let poll = locked_poll_interval(vault.config().inactivity_timeout);
                    vault
                        .idle_deadline()
                        .unwrap_or_else(|| std::time::Instant::now() + poll)
                };
                drop(inner);

                tokio::time::sleep_until(tokio::time::Instant::from_std(wake_at)).await;
            }
            debug!("Auto-lock task finished");
        });
        AutoLockTask { handle }
    }
}

/// Handle to the auto-lock timer. Dropping it stops the timer.
#[derive(Debug)]
pub struct AutoLockTask {
    handle: JoinHandle<()>,
}

impl AutoLockTask {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for AutoLockTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_poll_interval_is_clamped() {
        assert_eq!(locked_poll_interval(Duration::ZERO), MIN_POLL_INTERVAL);
        assert_eq!(
            locked_poll_interval(Duration::from_millis(200)),
            Duration::from_millis(200)
        );
        assert_eq!(
            locked_poll_interval(Duration::from_secs(30 * 60)),
            LOCKED_POLL_INTERVAL
        );
    }
}
