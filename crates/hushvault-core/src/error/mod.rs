//! Error types for the vault crate
//!
//! This module re-exports every error type and its context structures, so
//! callers can match on them from one place.

pub use crate::crypto::{CryptoError, KeyAccessError};
pub use crate::entry::{EntryContext, EntryDecryptionError, EntryEncryptionError};
pub use crate::store::StoreError;
pub use crate::vault::{KeyManagerError, VaultError, WeakPasswordReason};
