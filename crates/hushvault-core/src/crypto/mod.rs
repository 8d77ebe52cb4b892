//! Cryptographic primitives for the vault: key container and key derivation

pub mod kdf;
pub mod keys;
mod thread_safety; // Send + Sync impls for SessionKey

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
///
/// None of these variants are shown to the user during a password check;
/// the key manager folds them into a uniform "incorrect password" outcome.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key derivation failed, typically due to scrypt computation error.
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// Invalid scrypt parameters in the configuration or a stored credential.
    ///
    /// **[PROGRAMMING ERROR]** or a corrupted credential record.
    #[error("Invalid KDF parameters: {0}")]
    InvalidKdfParams(String),

    /// The operating system random source failed.
    #[error("RNG failed: {0}")]
    Rng(String),

    /// Key access failed due to memory protection error or lock poisoning.
    ///
    /// **[SYSTEM ERROR]** This indicates a failure in the memory protection
    /// subsystem (mlock, mprotect).
    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

// Re-export commonly used types
pub use kdf::{KdfParams, SALT_LEN, derive_key, generate_salt};
pub use keys::{KeyAccessError, SESSION_KEY_LEN, SessionKey};
