use std::collections::BTreeMap;

use super::{StoreError, VaultStore};
use crate::entry::{EntryId, EntryRecord};
use crate::vault::credential::VaultCredential;

/// In-process store, for tests and for embedding with a host-managed medium.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    credential: Option<VaultCredential>,
    entries: BTreeMap<EntryId, EntryRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to a stored record, for tamper tests.
    pub fn entry_mut(&mut self, id: &EntryId) -> Option<&mut EntryRecord> {
        self.entries.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VaultStore for MemoryStore {
    fn load_credential(&self) -> Result<Option<VaultCredential>, StoreError> {
        Ok(self.credential.clone())
    }

    fn save_credential(&mut self, credential: &VaultCredential) -> Result<(), StoreError> {
        self.credential = Some(credential.clone());
        Ok(())
    }

    fn load_entry(&self, id: &EntryId) -> Result<Option<EntryRecord>, StoreError> {
        Ok(self.entries.get(id).cloned())
    }

    fn save_entry(&mut self, record: &EntryRecord) -> Result<(), StoreError> {
        self.entries.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete_entry(&mut self, id: &EntryId) -> Result<bool, StoreError> {
        Ok(self.entries.remove(id).is_some())
    }

    fn list_entries(&self) -> Result<Vec<EntryRecord>, StoreError> {
        Ok(self.entries.values().cloned().collect())
    }

    fn replace_all(
        &mut self,
        credential: &VaultCredential,
        entries: &[EntryRecord],
    ) -> Result<(), StoreError> {
        self.credential = Some(credential.clone());
        self.entries = entries
            .iter()
            .map(|record| (record.id.clone(), record.clone()))
            .collect();
        Ok(())
    }

    fn purge(&mut self) -> Result<(), StoreError> {
        self.credential = None;
        self.entries.clear();
        Ok(())
    }
}
