//! Password-protected, client-side encrypted vault for journal entries.
//!
//! A user password is stretched with scrypt into a 256-bit session key. Each
//! entry is sealed with AES-256-GCM under that key and persisted as an opaque
//! record through a [`store::VaultStore`]. Neither the password nor the key is
//! ever written anywhere.
//!
//! There is no recovery: losing the password makes every entry unreadable.
//!
//! # Modules
//!
//! - [`crypto`]: key derivation and the protected key container
//! - [`entry`]: the entry codec and persisted record shapes
//! - [`vault`]: key manager, password policy and the vault state machine
//! - [`store`]: storage backends
//! - [`config`]: tunables
//!
//! # Example
//!
//! ```
//! use hushvault_core::{MemoryStore, Vault, VaultConfig, VaultState};
//! use hushvault_core::crypto::KdfParams;
//!
//! let config = VaultConfig::default().with_kdf(KdfParams { log2_n: 10, r: 8, p: 1 });
//! let mut vault = Vault::open(MemoryStore::new(), config)?;
//! vault.set_password("Tr0ub4dor&3")?;
//!
//! let record = vault.save_entry("Note", "hello world")?;
//! vault.lock();
//! assert_eq!(vault.state(), VaultState::Locked);
//!
//! vault.unlock("Tr0ub4dor&3")?;
//! assert_eq!(vault.read_entry(&record.id)?.content.as_str(), "hello world");
//! # Ok::<(), hushvault_core::VaultError>(())
//! ```

pub mod config;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod store;
pub mod vault;

pub use config::VaultConfig;
pub use entry::{EntryId, EntryRecord, EntrySummary, TitlePolicy, VaultEntry};
pub use store::{FileStore, MemoryStore, VaultStore};
pub use vault::{
    IRRECOVERABLE_LOSS_WARNING, LockReason, PasswordPolicy, Vault, VaultCredential, VaultError,
    VaultState,
};

#[cfg(feature = "async")]
pub use vault::handle::{AutoLockTask, DerivationTask, SharedVault};
