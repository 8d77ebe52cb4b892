//! Entry codec: authenticated encryption of individual vault entries

pub mod codec;
pub mod record;

pub use codec::{
    EntryContext, EntryDecryptionError, EntryEncryptionError, NONCE_LEN, SealedPayload, TAG_LEN,
    decrypt, decrypt_with_context, encrypt, encrypt_with_context,
};
pub use record::{EntryId, EntryRecord, EntrySummary, TitlePolicy, VaultEntry};
