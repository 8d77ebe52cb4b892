#![cfg(feature = "async")]

use std::time::Duration;

use hushvault_core::crypto::KdfParams;
use hushvault_core::{MemoryStore, SharedVault, Vault, VaultConfig, VaultError, VaultState};
use secrecy::SecretString;

const PASSWORD: &str = "Tr0ub4dor&3";

fn config() -> VaultConfig {
    VaultConfig::default().with_kdf(KdfParams {
        log2_n: 10,
        r: 8,
        p: 1,
    })
}

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

async fn shared_vault(config: VaultConfig) -> SharedVault<MemoryStore> {
    let shared = SharedVault::new(Vault::open(MemoryStore::new(), config).unwrap());
    shared.set_password(secret(PASSWORD)).await.unwrap();
    shared
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unlock_off_the_mutex() {
    let shared = shared_vault(config()).await;
    let id = shared.save_entry("Note", "hello world").await.unwrap().id;
    shared.lock().await;

    let (task, credential) = shared.begin_unlock(secret(PASSWORD)).await.unwrap();
    // The vault stays usable while the derivation runs.
    assert_eq!(shared.list_entries().await.unwrap().len(), 1);
    shared.finish_unlock(task, &credential).await.unwrap();

    assert_eq!(shared.state().await, VaultState::Unlocked);
    let entry = shared.read_entry(&id).await.unwrap();
    assert_eq!(entry.content.as_str(), "hello world");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_password_async() {
    let shared = shared_vault(config()).await;
    shared.lock().await;

    let result = shared.unlock(secret("Wr0ng!Password")).await;
    assert!(matches!(result, Err(VaultError::IncorrectPassword)));
    assert_eq!(shared.state().await, VaultState::Locked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_derivation_installs_nothing() {
    let shared = shared_vault(config()).await;
    shared.lock().await;

    let (task, _credential) = shared.begin_unlock(secret(PASSWORD)).await.unwrap();
    task.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(shared.state().await, VaultState::Locked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_credential_change_during_unlock_is_rejected() {
    let shared = shared_vault(config()).await;
    shared.lock().await;

    let (task, credential) = shared.begin_unlock(secret(PASSWORD)).await.unwrap();
    shared
        .change_password(secret(PASSWORD), secret("N3w!Passphrase"))
        .await
        .unwrap();

    let result = shared.finish_unlock(task, &credential).await;
    assert!(matches!(result, Err(VaultError::IncorrectPassword)));
    assert_eq!(shared.state().await, VaultState::Locked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_begin_set_password_only_derives() {
    let shared = SharedVault::new(Vault::open(MemoryStore::new(), config()).unwrap());
    let task = shared.begin_set_password(secret(PASSWORD)).await.unwrap();
    while task.is_pending() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let (credential, _key) = task.wait().await.unwrap();
    assert_eq!(credential.kdf.log2_n, 10);
    assert_eq!(shared.state().await, VaultState::NoPassword);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_set_password_twice_async() {
    let shared = shared_vault(config()).await;
    let result = shared.set_password(secret("An0ther!Pass")).await;
    assert!(matches!(result, Err(VaultError::AlreadyExists)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auto_lock_fires() {
    let config = config().with_inactivity_timeout(Duration::from_millis(100));
    let shared = shared_vault(config).await;
    let id = shared.save_entry("Note", "hello").await.unwrap().id;

    let auto_lock = shared.spawn_auto_lock();
    assert!(auto_lock.is_running());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let locked = shared.with(|vault| vault.idle_deadline().is_none()).await;
    assert!(locked, "auto-lock task should have ended the session");
    assert!(matches!(
        shared.read_entry(&id).await,
        Err(VaultError::Locked)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auto_lock_stops_on_drop() {
    let shared = shared_vault(config()).await;
    let auto_lock = shared.spawn_auto_lock();
    auto_lock.abort();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!auto_lock.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_vault_responsive_during_password_change() {
    let slow = config().with_kdf(KdfParams {
        log2_n: 16,
        r: 8,
        p: 1,
    });
    let shared = shared_vault(slow).await;
    shared.save_entry("Note", "hello world").await.unwrap();

    let (task, credential) = shared
        .begin_change_password(secret(PASSWORD), secret("N3w!Passphrase"))
        .await
        .unwrap();
    // Two derivations are running; the vault is not held meanwhile.
    assert_eq!(shared.list_entries().await.unwrap().len(), 1);
    assert!(task.is_pending());

    shared.finish_change_password(task, &credential).await.unwrap();
    shared.lock().await;
    assert!(matches!(
        shared.unlock(secret(PASSWORD)).await,
        Err(VaultError::IncorrectPassword)
    ));
    shared.unlock(secret("N3w!Passphrase")).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_change_password_async_reencrypts() {
    let shared = shared_vault(config()).await;
    let id = shared.save_entry("Note", "kept").await.unwrap().id;

    shared
        .change_password(secret(PASSWORD), secret("N3w!Passphrase"))
        .await
        .unwrap();
    assert_eq!(shared.state().await, VaultState::Unlocked);
    assert_eq!(shared.read_entry(&id).await.unwrap().content.as_str(), "kept");

    let result = shared
        .change_password(secret(PASSWORD), secret("An0ther!Pass"))
        .await;
    assert!(matches!(result, Err(VaultError::IncorrectPassword)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_rotation_is_discarded() {
    let shared = shared_vault(config()).await;
    let id = shared.save_entry("Note", "kept").await.unwrap().id;

    let (task, credential) = shared
        .begin_change_password(secret(PASSWORD), secret("N3w!Passphrase"))
        .await
        .unwrap();
    shared
        .change_password(secret(PASSWORD), secret("An0ther!Pass"))
        .await
        .unwrap();

    let result = shared.finish_change_password(task, &credential).await;
    assert!(matches!(result, Err(VaultError::IncorrectPassword)));

    shared.lock().await;
    shared.unlock(secret("An0ther!Pass")).await.unwrap();
    assert_eq!(shared.read_entry(&id).await.unwrap().content.as_str(), "kept");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remove_password_async() {
    let shared = shared_vault(config()).await;
    shared.save_entry("Note", "gone").await.unwrap();

    let result = shared.remove_password(secret("Wr0ng!Password")).await;
    assert!(matches!(result, Err(VaultError::IncorrectPassword)));
    assert_eq!(shared.list_entries().await.unwrap().len(), 1);

    shared.remove_password(secret(PASSWORD)).await.unwrap();
    assert_eq!(shared.state().await, VaultState::NoPassword);
    assert!(shared.list_entries().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auto_lock_with_zero_timeout() {
    let config = config().with_inactivity_timeout(Duration::ZERO);
    let shared = shared_vault(config).await;
    let auto_lock = shared.spawn_auto_lock();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(shared.state().await, VaultState::Locked);
    assert!(auto_lock.is_running());
}

