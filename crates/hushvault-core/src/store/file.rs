use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, trace};

use super::{StoreError, VaultStore};
use crate::entry::{EntryId, EntryRecord};
use crate::vault::credential::VaultCredential;

/// Name of the vault document inside the store directory.
pub const STORE_FILE_NAME: &str = "vault.json";

const DOCUMENT_VERSION: u32 = 1;
const PRIVATE_DIR_MODE: u32 = 0o700;
const PRIVATE_FILE_MODE: u32 = 0o600;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VaultDocument {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential: Option<VaultCredential>,
    #[serde(default)]
    entries: Vec<EntryRecord>,
}

/// Store backed by a single JSON document on local disk.
///
/// Every mutation rewrites the whole document to a temp file in the same
/// directory and renames it into place, so each call (including
/// `replace_all` and `purge`) is atomic on POSIX filesystems. The directory
/// is created `0700` and the document `0600` on Unix.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    document: VaultDocument,
}

impl FileStore {
    /// Open the store in `dir`, creating the directory if needed.
    ///
    /// A missing document is treated as an empty vault.
    #[instrument(level = "debug", fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path> + std::fmt::Debug) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(e, &dir))?;
        set_permissions(&dir, PRIVATE_DIR_MODE)?;

        let path = dir.join(STORE_FILE_NAME);
        let document = match fs::read(&path) {
            Ok(bytes) => {
                let document: VaultDocument = serde_json::from_slice(&bytes)?;
                if document.version != DOCUMENT_VERSION {
                    return Err(StoreError::Corrupt(format!(
                        "unsupported document version {}",
                        document.version
                    )));
                }
                debug!(entries = document.entries.len(), "Vault document loaded");
                document
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VaultDocument {
                version: DOCUMENT_VERSION,
                ..VaultDocument::default()
            },
            Err(e) => return Err(StoreError::io(e, path)),
        };

        Ok(Self { dir, document })
    }

    /// Directory holding the document.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the document.
    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE_NAME)
    }

    /// Apply `change` to a copy of the document, persist it, then adopt it.
    fn commit<F>(&mut self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut VaultDocument),
    {
        let mut next = self.document.clone();
        change(&mut next);
        self.write_document(&next)?;
        self.document = next;
        Ok(())
    }

    fn write_document(&self, document: &VaultDocument) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let path = self.path();

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(e, &self.dir))?;
        temp.write_all(&bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| StoreError::io(e, temp.path()))?;
        set_permissions(temp.path(), PRIVATE_FILE_MODE)?;
        temp.persist(&path)
            .map_err(|e| StoreError::io(e.error, &path))?;

        trace!(bytes = bytes.len(), "Vault document written");
        Ok(())
    }
}

impl VaultStore for FileStore {
    fn load_credential(&self) -> Result<Option<VaultCredential>, StoreError> {
        Ok(self.document.credential.clone())
    }

    fn save_credential(&mut self, credential: &VaultCredential) -> Result<(), StoreError> {
        self.commit(|doc| doc.credential = Some(credential.clone()))
    }

    fn load_entry(&self, id: &EntryId) -> Result<Option<EntryRecord>, StoreError> {
        Ok(self.document.entries.iter().find(|e| &e.id == id).cloned())
    }

    fn save_entry(&mut self, record: &EntryRecord) -> Result<(), StoreError> {
        self.commit(|doc| {
            if let Some(existing) = doc.entries.iter_mut().find(|e| e.id == record.id) {
                *existing = record.clone();
            } else {
                doc.entries.push(record.clone());
            }
        })
    }

    fn delete_entry(&mut self, id: &EntryId) -> Result<bool, StoreError> {
        if !self.document.entries.iter().any(|e| &e.id == id) {
            return Ok(false);
        }
        self.commit(|doc| doc.entries.retain(|e| &e.id != id))?;
        Ok(true)
    }

    fn list_entries(&self) -> Result<Vec<EntryRecord>, StoreError> {
        Ok(self.document.entries.clone())
    }

    fn replace_all(
        &mut self,
        credential: &VaultCredential,
        entries: &[EntryRecord],
    ) -> Result<(), StoreError> {
        self.commit(|doc| {
            doc.credential = Some(credential.clone());
            doc.entries = entries.to_vec();
        })
    }

    fn purge(&mut self) -> Result<(), StoreError> {
        self.commit(|doc| {
            doc.credential = None;
            doc.entries.clear();
        })
    }
}

/// Applies Unix permissions when supported.
fn set_permissions(path: &Path, mode: u32) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| StoreError::io(e, path))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}
