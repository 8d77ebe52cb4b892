//! AES-256-GCM sealing of entry payloads under the session key.

use std::fmt;

use aead::Payload;
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use thiserror::Error;
use tracing::{instrument, trace, warn};
use zeroize::Zeroizing;

use crate::crypto::keys::{KeyAccessError, SessionKey};

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Context for entry operations, providing debugging information.
///
/// Never carries plaintext content.
#[derive(Debug, Clone, Default)]
pub struct EntryContext {
    /// The entry id (if known)
    pub entry_id: Option<String>,
    /// The clear-text title (if the title policy keeps one)
    pub title: Option<String>,
}

impl EntryContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry_id(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = Some(entry_id.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        if !title.is_empty() {
            self.title = Some(title);
        }
        self
    }
}

impl fmt::Display for EntryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref id) = self.entry_id {
            let display_id = if id.chars().count() > 8 {
                format!("{}...", id.chars().take(8).collect::<String>())
            } else {
                id.clone()
            };
            parts.push(format!("entry {display_id}"));
        }
        if let Some(ref title) = self.title {
            parts.push(format!("'{title}'"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

#[derive(Error, Debug)]
pub enum EntryDecryptionError {
    /// Authentication tag verification failed.
    ///
    /// **[INTEGRITY VIOLATION]** Wrong key, corrupted data, or tampering. These are
    /// cryptographically indistinguishable. The entry is unreadable.
    #[error(
        "[INTEGRITY VIOLATION] Failed to decrypt {context}: invalid authentication tag - wrong key or tampered data"
    )]
    Authentication { context: EntryContext },

    /// The sealed payload has invalid structure (wrong nonce or tag length).
    #[error("Malformed ciphertext for {context}: {reason}")]
    Malformed {
        reason: String,
        context: EntryContext,
    },

    /// The decrypted body could not be parsed.
    #[error("Invalid entry body for {context}: {reason}")]
    InvalidBody {
        reason: String,
        context: EntryContext,
    },

    /// Key access failed due to memory protection error or lock poisoning
    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

impl EntryDecryptionError {
    /// Add or update context on an existing error
    #[must_use]
    pub fn with_context(self, context: EntryContext) -> Self {
        match self {
            EntryDecryptionError::Authentication { .. } => {
                EntryDecryptionError::Authentication { context }
            }
            EntryDecryptionError::Malformed { reason, .. } => {
                EntryDecryptionError::Malformed { reason, context }
            }
            EntryDecryptionError::InvalidBody { reason, .. } => {
                EntryDecryptionError::InvalidBody { reason, context }
            }
            EntryDecryptionError::KeyAccess(e) => EntryDecryptionError::KeyAccess(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum EntryEncryptionError {
    /// Encryption failed unexpectedly
    #[error("Failed to encrypt {context}: {reason}")]
    Encryption {
        reason: String,
        context: EntryContext,
    },

    /// Key access failed due to memory protection error or lock poisoning
    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

/// One AEAD output: nonce, ciphertext and tag, kept apart for storage.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub iv: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedPayload")
            .field("iv", &hex::encode(self.iv))
            .field("ciphertext_len", &self.ciphertext.len())
            .field("tag", &hex::encode(self.tag))
            .finish()
    }
}

impl SealedPayload {
    /// Rebuild a payload from stored byte fields, checking lengths.
    pub fn from_parts(
        iv: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Self, EntryDecryptionError> {
        let iv: [u8; NONCE_LEN] =
            iv.try_into()
                .map_err(|_| EntryDecryptionError::Malformed {
                    reason: format!("expected {NONCE_LEN}-byte iv, got {} bytes", iv.len()),
                    context: EntryContext::new(),
                })?;
        let tag: [u8; TAG_LEN] =
            tag.try_into()
                .map_err(|_| EntryDecryptionError::Malformed {
                    reason: format!("expected {TAG_LEN}-byte tag, got {} bytes", tag.len()),
                    context: EntryContext::new(),
                })?;
        Ok(Self {
            iv,
            ciphertext: ciphertext.to_vec(),
            tag,
        })
    }
}

/// Seal `plaintext` under the session key with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &SessionKey) -> Result<SealedPayload, EntryEncryptionError> {
    encrypt_with_context(plaintext, key, &[], &EntryContext::new())
}

/// Seal `plaintext` with associated data and contextual error information.
///
/// The associated data is authenticated but not stored; the same bytes must be
/// supplied to [`decrypt_with_context`].
#[instrument(level = "debug", skip(plaintext, key, aad), fields(plaintext_size = plaintext.len()))]
pub fn encrypt_with_context(
    plaintext: &[u8],
    key: &SessionKey,
    aad: &[u8],
    context: &EntryContext,
) -> Result<SealedPayload, EntryEncryptionError> {
    let mut iv = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut iv);

    key.with_key(|key_bytes| {
        let key: &Key<Aes256Gcm> = key_bytes.into();
        let cipher = Aes256Gcm::new(key);

        let payload = Payload {
            msg: plaintext,
            aad,
        };

        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&iv), payload)
            .map_err(|e| EntryEncryptionError::Encryption {
                reason: e.to_string(),
                context: context.clone(),
            })?;

        // aes-gcm appends the tag to the ciphertext
        let tag_start = sealed.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&sealed[tag_start..]);
        sealed.truncate(tag_start);

        trace!(ciphertext_size = sealed.len(), "Entry sealed");
        Ok(SealedPayload {
            iv,
            ciphertext: sealed,
            tag,
        })
    })?
}

/// Open a sealed payload, verifying its tag before returning any plaintext.
pub fn decrypt(
    payload: &SealedPayload,
    key: &SessionKey,
) -> Result<Zeroizing<Vec<u8>>, EntryDecryptionError> {
    decrypt_with_context(payload, key, &[], &EntryContext::new())
}

/// Open a sealed payload with associated data and contextual error information.
#[instrument(level = "debug", skip(payload, key, aad), fields(ciphertext_size = payload.ciphertext.len()))]
pub fn decrypt_with_context(
    payload: &SealedPayload,
    key: &SessionKey,
    aad: &[u8],
    context: &EntryContext,
) -> Result<Zeroizing<Vec<u8>>, EntryDecryptionError> {
    let mut ciphertext_with_tag = Vec::with_capacity(payload.ciphertext.len() + TAG_LEN);
    ciphertext_with_tag.extend_from_slice(&payload.ciphertext);
    ciphertext_with_tag.extend_from_slice(&payload.tag);

    key.with_key(|key_bytes| {
        let key: &Key<Aes256Gcm> = key_bytes.into();
        let cipher = Aes256Gcm::new(key);

        let sealed = Payload {
            msg: &ciphertext_with_tag,
            aad,
        };

        cipher
            .decrypt(Nonce::from_slice(&payload.iv), sealed)
            .map(Zeroizing::new)
            .map_err(|_| {
                warn!(%context, "Entry decryption failed - authentication tag mismatch");
                EntryDecryptionError::Authentication {
                    context: context.clone(),
                }
            })
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SessionKey {
        SessionKey::new([byte; 32]).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let k = key(1);
        let sealed = encrypt(b"hello world", &k).unwrap();
        assert_eq!(sealed.ciphertext.len(), 11);
        let opened = decrypt(&sealed, &k).unwrap();
        assert_eq!(opened.as_slice(), b"hello world");
    }

    #[test]
    fn test_empty_plaintext() {
        let k = key(1);
        let sealed = encrypt(b"", &k).unwrap();
        assert!(sealed.ciphertext.is_empty());
        let opened = decrypt(&sealed, &k).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let k = key(1);
        let a = encrypt(b"same", &k).unwrap();
        let b = encrypt(b"same", &k).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_aad_mismatch_fails() {
        let k = key(1);
        let ctx = EntryContext::new().with_entry_id("abc");
        let sealed = encrypt_with_context(b"content", &k, b"entry-a", &ctx).unwrap();
        let result = decrypt_with_context(&sealed, &k, b"entry-b", &ctx);
        assert!(matches!(
            result,
            Err(EntryDecryptionError::Authentication { .. })
        ));
    }

    #[test]
    fn test_from_parts_rejects_bad_lengths() {
        let result = SealedPayload::from_parts(&[0u8; 11], b"x", &[0u8; 16]);
        assert!(matches!(result, Err(EntryDecryptionError::Malformed { .. })));
        let result = SealedPayload::from_parts(&[0u8; 12], b"x", &[0u8; 15]);
        assert!(matches!(result, Err(EntryDecryptionError::Malformed { .. })));
    }

    #[test]
    fn test_context_display() {
        let ctx = EntryContext::new()
            .with_entry_id("0123456789abcdef")
            .with_title("Note");
        assert_eq!(ctx.to_string(), "entry 01234567... 'Note'");
        assert_eq!(EntryContext::new().to_string(), "(no context)");
        assert!(EntryContext::new().with_title("").title.is_none());
    }
}
