#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use subtle::ConstantTimeEq;

use crate::crypto::{CryptoError, KdfParams, SessionKey, derive_key, generate_salt};

/// Current credential record format.
pub const CREDENTIAL_VERSION: u32 = 1;

/// Label authenticated under the derived key to form the verifier.
const VERIFIER_LABEL: &[u8] = b"hushvault.verifier.v1";

/// Password-derived protection state for one vault (the persisted CredentialRecord).
///
/// Holds what is needed to re-derive and check a key, and nothing that reveals
/// the key or the password:
/// - a random salt, fixed for the credential's lifetime
/// - the scrypt work factor it was created with
/// - a verifier: HMAC-SHA256 of a fixed label under the derived key
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultCredential {
    pub version: u32,

    #[serde_as(as = "Base64")]
    pub salt: Vec<u8>,

    pub kdf: KdfParams,

    #[serde_as(as = "Base64")]
    pub verifier: Vec<u8>,

    pub created_at: DateTime<Utc>,
}

impl VaultCredential {
    /// Create a credential for `password` with a fresh salt.
    ///
    /// Returns the credential together with the key it was derived from, so the
    /// caller can open a session without deriving twice.
    pub fn create(password: &str, kdf: KdfParams) -> Result<(Self, SessionKey), CryptoError> {
        let salt = generate_salt()?;
        let key = derive_key(password, &salt, &kdf)?;
        let verifier = compute_verifier(&key)?;

        let credential = Self {
            version: CREDENTIAL_VERSION,
            salt: salt.to_vec(),
            kdf,
            verifier,
            created_at: Utc::now(),
        };
        Ok((credential, key))
    }

    /// Re-derive the key for `password` from this credential's salt and parameters.
    ///
    /// This does not check the verifier; use [`VaultCredential::check`] for that.
    pub fn derive(&self, password: &str) -> Result<SessionKey, CryptoError> {
        derive_key(password, &self.salt, &self.kdf)
    }

    /// Constant-time check that `key` matches the stored verifier.
    pub fn check(&self, key: &SessionKey) -> Result<bool, CryptoError> {
        let computed = compute_verifier(key)?;
        Ok(bool::from(computed.as_slice().ct_eq(self.verifier.as_slice())))
    }
}

fn compute_verifier(key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    let tag = key.with_key(|key_bytes| {
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key_bytes);
        hmac::sign(&hmac_key, VERIFIER_LABEL).as_ref().to_vec()
    })?;
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams {
            log2_n: 10,
            r: 8,
            p: 1,
        }
    }

    #[test]
    fn test_create_and_check() {
        let (credential, key) = VaultCredential::create("Str0ng!Pass", fast()).unwrap();
        assert_eq!(credential.salt.len(), 16);
        assert_eq!(credential.verifier.len(), 32);
        assert!(credential.check(&key).unwrap());

        let again = credential.derive("Str0ng!Pass").unwrap();
        assert!(credential.check(&again).unwrap());

        let wrong = credential.derive("Wr0ng!Pass").unwrap();
        assert!(!credential.check(&wrong).unwrap());
    }

    #[test]
    fn test_verifier_is_not_the_key() {
        let (credential, key) = VaultCredential::create("Str0ng!Pass", fast()).unwrap();
        key.with_key(|bytes| assert_ne!(bytes.as_slice(), credential.verifier.as_slice()))
            .unwrap();
    }

    #[test]
    fn test_record_json_roundtrip() {
        let (credential, _key) = VaultCredential::create("Str0ng!Pass", fast()).unwrap();
        let json = serde_json::to_string(&credential).unwrap();
        assert!(json.contains("\"salt\""));
        assert!(json.contains("\"verifier\""));
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("Str0ng"));

        let parsed: VaultCredential = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, credential);
    }

    #[test]
    fn test_truncated_verifier_never_matches() {
        let (mut credential, key) = VaultCredential::create("Str0ng!Pass", fast()).unwrap();
        credential.verifier.truncate(16);
        assert!(!credential.check(&key).unwrap());
    }
}
