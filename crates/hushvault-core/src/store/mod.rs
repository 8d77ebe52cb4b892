//! Persistence for credential and entry records.
//!
//! The vault never assumes a storage medium. A store only ever holds the two
//! record shapes, [`VaultCredential`] and [`EntryRecord`]; it never sees a
//! password, a key or plaintext.

mod file;
mod memory;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::entry::{EntryId, EntryRecord};
use crate::vault::credential::VaultCredential;

pub use file::{FileStore, STORE_FILE_NAME};
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error("Failed to (de)serialize vault document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Vault document is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    #[must_use]
    pub fn io(source: io::Error, path: impl Into<PathBuf>) -> Self {
        StoreError::Io {
            source,
            path: path.into(),
        }
    }
}

/// String-keyed record storage used by the vault.
///
/// Implementations must make [`VaultStore::replace_all`] and
/// [`VaultStore::purge`] all-or-nothing: a crash must never leave entries
/// sealed under a key that no stored credential can derive.
pub trait VaultStore {
    fn load_credential(&self) -> Result<Option<VaultCredential>, StoreError>;

    fn save_credential(&mut self, credential: &VaultCredential) -> Result<(), StoreError>;

    fn load_entry(&self, id: &EntryId) -> Result<Option<EntryRecord>, StoreError>;

    /// Insert or overwrite the record with the same id.
    fn save_entry(&mut self, record: &EntryRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    fn delete_entry(&mut self, id: &EntryId) -> Result<bool, StoreError>;

    fn list_entries(&self) -> Result<Vec<EntryRecord>, StoreError>;

    /// Replace the credential and every entry in one step.
    fn replace_all(
        &mut self,
        credential: &VaultCredential,
        entries: &[EntryRecord],
    ) -> Result<(), StoreError>;

    /// Delete the credential and every entry in one step.
    fn purge(&mut self) -> Result<(), StoreError>;
}
