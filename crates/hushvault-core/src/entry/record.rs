//! Persisted entry records and the sealed body inside them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use tracing::instrument;
use zeroize::Zeroizing;

use super::codec::{
    EntryContext, EntryDecryptionError, EntryEncryptionError, SealedPayload, decrypt_with_context,
    encrypt_with_context,
};
use crate::crypto::keys::SessionKey;

/// Domain separation prefix for the associated data bound to each entry.
const ENTRY_AAD_PREFIX: &[u8] = b"hushvault.entry.v2:";

/// Opaque, unique entry identifier (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an entry's title lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitlePolicy {
    /// Title stored in the clear, so entries can be listed and sorted while locked.
    #[default]
    Plaintext,
    /// Title sealed with the content; the record's title field is empty.
    Sealed,
}

/// One persisted, encrypted entry.
///
/// Timestamps stay in the clear for sorting. Content (and, under
/// [`TitlePolicy::Sealed`], the title) lives only inside the ciphertext.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    pub id: EntryId,
    pub title: String,
    #[serde_as(as = "Base64")]
    pub iv: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub ciphertext: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub tag: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Plaintext inside the AEAD envelope.
#[derive(Serialize, Deserialize)]
struct EntryBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    content: String,
}

/// A decrypted entry, ready for display.
#[derive(Clone)]
pub struct VaultEntry {
    pub id: EntryId,
    pub title: String,
    pub content: Zeroizing<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for VaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultEntry")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("content", &format_args!("[{} bytes]", self.content.len()))
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Entry metadata readable without the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub id: EntryId,
    /// `None` when the title is sealed.
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&EntryRecord> for EntrySummary {
    fn from(record: &EntryRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: (!record.title.is_empty()).then(|| record.title.clone()),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Associated data binding a record's clear fields to its ciphertext.
///
/// Each variable-length field is length-prefixed; timestamps are encoded as
/// seconds and nanoseconds since the epoch, which survive the JSON round trip.
fn entry_aad(
    id: &EntryId,
    title: &str,
    created_at: &DateTime<Utc>,
    updated_at: &DateTime<Utc>,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(ENTRY_AAD_PREFIX.len() + id.as_str().len() + title.len() + 40);
    aad.extend_from_slice(ENTRY_AAD_PREFIX);
    for field in [id.as_str().as_bytes(), title.as_bytes()] {
        aad.extend_from_slice(&(field.len() as u64).to_be_bytes());
        aad.extend_from_slice(field);
    }
    for timestamp in [created_at, updated_at] {
        aad.extend_from_slice(&timestamp.timestamp().to_be_bytes());
        aad.extend_from_slice(&timestamp.timestamp_subsec_nanos().to_be_bytes());
    }
    aad
}

impl EntryRecord {
    /// Seal a new or edited entry under `key`.
    ///
    /// `created_at` is carried over on edits; `updated_at` is always now.
    pub fn seal(
        id: EntryId,
        title: &str,
        content: &str,
        created_at: DateTime<Utc>,
        policy: TitlePolicy,
        key: &SessionKey,
    ) -> Result<Self, EntryEncryptionError> {
        Self::seal_at(id, title, content, created_at, Utc::now(), policy, key)
    }

    /// Seal with an explicit `updated_at`, for re-encryption that keeps history.
    ///
    /// The id, clear title and both timestamps are authenticated with the body.
    #[instrument(level = "debug", skip(title, content, key), fields(entry_id = %id))]
    pub fn seal_at(
        id: EntryId,
        title: &str,
        content: &str,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        policy: TitlePolicy,
        key: &SessionKey,
    ) -> Result<Self, EntryEncryptionError> {
        let (record_title, body_title) = match policy {
            TitlePolicy::Plaintext => (title.to_string(), None),
            TitlePolicy::Sealed => (String::new(), Some(title.to_string())),
        };
        let context = EntryContext::new()
            .with_entry_id(id.as_str())
            .with_title(record_title.as_str());

        let body = EntryBody {
            title: body_title,
            content: content.to_string(),
        };
        let plaintext = Zeroizing::new(serde_json::to_vec(&body).map_err(|e| {
            EntryEncryptionError::Encryption {
                reason: format!("failed to serialize entry body: {e}"),
                context: context.clone(),
            }
        })?);

        let aad = entry_aad(&id, &record_title, &created_at, &updated_at);
        let sealed = encrypt_with_context(&plaintext, key, &aad, &context)?;

        Ok(Self {
            id,
            title: record_title,
            iv: sealed.iv.to_vec(),
            ciphertext: sealed.ciphertext,
            tag: sealed.tag.to_vec(),
            created_at,
            updated_at,
        })
    }

    /// Decrypt this record under `key`.
    #[instrument(level = "debug", skip(self, key), fields(entry_id = %self.id))]
    pub fn open(&self, key: &SessionKey) -> Result<VaultEntry, EntryDecryptionError> {
        let context = self.context();
        let sealed = SealedPayload::from_parts(&self.iv, &self.ciphertext, &self.tag)
            .map_err(|e| e.with_context(context.clone()))?;

        let aad = entry_aad(&self.id, &self.title, &self.created_at, &self.updated_at);
        let plaintext = decrypt_with_context(&sealed, key, &aad, &context)?;
        let body: EntryBody =
            serde_json::from_slice(&plaintext).map_err(|e| EntryDecryptionError::InvalidBody {
                reason: e.to_string(),
                context: context.clone(),
            })?;

        Ok(VaultEntry {
            id: self.id.clone(),
            title: body.title.unwrap_or_else(|| self.title.clone()),
            content: Zeroizing::new(body.content),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    /// Error context for this record.
    pub fn context(&self) -> EntryContext {
        EntryContext::new()
            .with_entry_id(self.id.as_str())
            .with_title(self.title.as_str())
    }
}
