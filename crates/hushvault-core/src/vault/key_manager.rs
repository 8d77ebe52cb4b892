//! Key Manager: turns passwords into session keys and checks them.
//!
//! Every failure while checking a password (bad stored parameters, KDF error,
//! verifier mismatch) comes back as the same [`KeyManagerError::IncorrectPassword`],
//! so callers cannot tell why an attempt failed.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::crypto::{CryptoError, KdfParams, SessionKey};

use super::credential::VaultCredential;
use super::password::{PasswordPolicy, WeakPasswordReason};

/// Errors returned by the key manager.
#[derive(Error, Debug)]
pub enum KeyManagerError {
    /// The new password does not meet the policy.
    #[error("Password too weak: {0}")]
    WeakPassword(#[from] WeakPasswordReason),

    /// The password did not verify. Deliberately carries no detail.
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Credential creation failed (RNG, KDF parameters, protected memory).
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Both keys involved in a password change, plus the replacement credential.
///
/// The caller re-encrypts every entry from `old_key` to `new_key`, then
/// persists `credential` together with the re-encrypted entries.
#[derive(Debug)]
pub struct KeyRotation {
    pub credential: VaultCredential,
    pub old_key: SessionKey,
    pub new_key: SessionKey,
}

/// Derives and verifies password keys under a policy and work factor.
#[derive(Debug, Clone, Default)]
pub struct KeyManager {
    policy: PasswordPolicy,
    kdf: KdfParams,
}

impl KeyManager {
    pub fn new(policy: PasswordPolicy, kdf: KdfParams) -> Self {
        Self { policy, kdf }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf
    }

    /// Derive a key from `password` and `salt` with this manager's work factor.
    pub fn derive_key(&self, password: &str, salt: &[u8]) -> Result<SessionKey, CryptoError> {
        crate::crypto::derive_key(password, salt, &self.kdf)
    }

    /// Create a credential for a new password.
    ///
    /// The policy is enforced before any key material is generated.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::WeakPassword`: the password fails the policy
    /// - `KeyManagerError::Crypto`: salt generation or derivation failed
    #[instrument(level = "debug", skip_all)]
    pub fn set_password(
        &self,
        password: &str,
    ) -> Result<(VaultCredential, SessionKey), KeyManagerError> {
        self.policy.check(password)?;
        let (credential, key) = VaultCredential::create(password, self.kdf)?;
        debug!("Credential created");
        Ok((credential, key))
    }

    /// Re-derive the key for `password` and check it against `credential`.
    ///
    /// # Errors
    ///
    /// `KeyManagerError::IncorrectPassword` on any failure.
    #[instrument(level = "debug", skip_all)]
    pub fn verify_password(
        &self,
        password: &str,
        credential: &VaultCredential,
    ) -> Result<SessionKey, KeyManagerError> {
        let key = credential.derive(password).map_err(|e| {
            debug!(error = %e, "Derivation failed during verification");
            KeyManagerError::IncorrectPassword
        })?;

        match credential.check(&key) {
            Ok(true) => Ok(key),
            Ok(false) => Err(KeyManagerError::IncorrectPassword),
            Err(e) => {
                debug!(error = %e, "Verifier check failed");
                Err(KeyManagerError::IncorrectPassword)
            }
        }
    }

    /// Verify `old_password`, then create a fresh credential for `new_password`.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::IncorrectPassword`: `old_password` did not verify
    /// - `KeyManagerError::WeakPassword`: `new_password` fails the policy
    /// - `KeyManagerError::Crypto`: the new credential could not be created
    pub fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
        credential: &VaultCredential,
    ) -> Result<KeyRotation, KeyManagerError> {
        let old_key = self.verify_password(old_password, credential)?;
        let (credential, new_key) = self.set_password(new_password)?;
        Ok(KeyRotation {
            credential,
            old_key,
            new_key,
        })
    }
}
