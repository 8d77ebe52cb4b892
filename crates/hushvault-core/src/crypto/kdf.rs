#![forbid(unsafe_code)]

//! Password-based key derivation (scrypt).

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

use super::CryptoError;
use super::keys::{SESSION_KEY_LEN, SessionKey};

/// Salt length in bytes (128 bits).
pub const SALT_LEN: usize = 16;

const DEFAULT_SCRYPT_COST_PARAM_LOG2: u8 = 15; // 2^15 = 32768
const DEFAULT_SCRYPT_BLOCK_SIZE: u32 = 8;
const DEFAULT_SCRYPT_PARALLELIZATION: u32 = 1;

/// Fast scrypt cost parameter for testing (N = 2^10 = 1024).
///
/// This is ~32x faster than the default and should ONLY be used for testing.
/// Enable by setting the `HUSHVAULT_FAST_KDF` environment variable to `1`.
const FAST_SCRYPT_COST_PARAM_LOG2: u8 = 10;

/// Lowest cost accepted when reading or configuring parameters.
const MIN_SCRYPT_COST_PARAM_LOG2: u8 = 10;

/// Highest cost accepted (N = 2^20, 1 GiB at r = 8).
const MAX_SCRYPT_COST_PARAM_LOG2: u8 = 20;

const MAX_SCRYPT_BLOCK_SIZE: u32 = 32;
const MAX_SCRYPT_PARALLELIZATION: u32 = 16;

/// Upper bound on scrypt's working memory, `128 * r * N` bytes.
const MAX_SCRYPT_MEMORY_BYTES: u64 = 1 << 30;

/// Check if fast KDF mode is enabled via environment variable.
///
/// **WARNING**: This is for testing only. Never use in production!
#[inline]
fn is_fast_kdf_enabled() -> bool {
    std::env::var("HUSHVAULT_FAST_KDF")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Scrypt work factor.
///
/// Stored alongside every credential so that a credential keeps unlocking
/// after the configured defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// log2 of the scrypt cost parameter N.
    pub log2_n: u8,
    /// Scrypt block size r.
    pub r: u32,
    /// Scrypt parallelization p.
    pub p: u32,
}

impl Default for KdfParams {
    /// `N = 2^15, r = 8, p = 1`, or `N = 2^10` when `HUSHVAULT_FAST_KDF=1`.
    fn default() -> Self {
        let log2_n = if is_fast_kdf_enabled() {
            FAST_SCRYPT_COST_PARAM_LOG2
        } else {
            DEFAULT_SCRYPT_COST_PARAM_LOG2
        };
        Self {
            log2_n,
            r: DEFAULT_SCRYPT_BLOCK_SIZE,
            p: DEFAULT_SCRYPT_PARALLELIZATION,
        }
    }
}

impl KdfParams {
    /// Build scrypt parameters, rejecting work factors outside the accepted range
    /// before any memory is allocated.
    fn to_scrypt(self) -> Result<scrypt::Params, CryptoError> {
        if self.log2_n < MIN_SCRYPT_COST_PARAM_LOG2 {
            return Err(CryptoError::InvalidKdfParams(format!(
                "cost N=2^{} is below the minimum 2^{MIN_SCRYPT_COST_PARAM_LOG2}",
                self.log2_n
            )));
        }
        if self.log2_n > MAX_SCRYPT_COST_PARAM_LOG2 {
            return Err(CryptoError::InvalidKdfParams(format!(
                "cost N=2^{} is above the maximum 2^{MAX_SCRYPT_COST_PARAM_LOG2}",
                self.log2_n
            )));
        }
        if self.r == 0 || self.r > MAX_SCRYPT_BLOCK_SIZE {
            return Err(CryptoError::InvalidKdfParams(format!(
                "block size r={} is outside 1..={MAX_SCRYPT_BLOCK_SIZE}",
                self.r
            )));
        }
        if self.p == 0 || self.p > MAX_SCRYPT_PARALLELIZATION {
            return Err(CryptoError::InvalidKdfParams(format!(
                "parallelization p={} is outside 1..={MAX_SCRYPT_PARALLELIZATION}",
                self.p
            )));
        }
        let memory = (128 * u64::from(self.r)) << self.log2_n;
        if memory > MAX_SCRYPT_MEMORY_BYTES {
            return Err(CryptoError::InvalidKdfParams(format!(
                "N=2^{} with r={} needs {memory} bytes, above the {MAX_SCRYPT_MEMORY_BYTES} byte limit",
                self.log2_n, self.r
            )));
        }
        scrypt::Params::new(self.log2_n, self.r, self.p, SESSION_KEY_LEN).map_err(|e| {
            CryptoError::InvalidKdfParams(format!(
                "Invalid scrypt parameters (N=2^{}, r={}, p={}): {}",
                self.log2_n, self.r, self.p, e
            ))
        })
    }
}

/// Generate a fresh random salt from the OS CSPRNG.
pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| CryptoError::Rng("Failed to generate salt".to_string()))?;
    Ok(salt)
}

/// Derive the session key from a password and salt.
///
/// The password is NFC-normalized first, so composed and decomposed forms of
/// the same text derive the same key. Equal inputs always give equal keys.
///
/// # Errors
///
/// - `CryptoError::InvalidKdfParams`: parameters out of range
/// - `CryptoError::KeyDerivationFailed`: scrypt computation failed
/// - `CryptoError::KeyAccess`: protected memory could not be set up
#[instrument(level = "debug", skip(password, salt), fields(log2_n = params.log2_n, r = params.r, p = params.p))]
pub fn derive_key(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<SessionKey, CryptoError> {
    let normalized_password = Zeroizing::new(password.nfc().collect::<String>());
    let scrypt_params = params.to_scrypt()?;

    let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    let start = std::time::Instant::now();
    scrypt::scrypt(
        normalized_password.as_bytes(),
        salt,
        &scrypt_params,
        &mut key[..],
    )
    .map_err(|e| CryptoError::KeyDerivationFailed(format!("Scrypt derivation failed: {e}")))?;
    debug!(elapsed = ?start.elapsed(), "Key derived");

    Ok(SessionKey::new(*key)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> KdfParams {
        KdfParams {
            log2_n: 10,
            r: 8,
            p: 1,
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [5u8; SALT_LEN];
        let a = derive_key("correct horse", &salt, &test_params()).unwrap();
        let b = derive_key("correct horse", &salt, &test_params()).unwrap();
        assert!(a.same_key_as(&b).unwrap());
    }

    #[test]
    fn test_salt_changes_key() {
        let a = derive_key("correct horse", &[1u8; SALT_LEN], &test_params()).unwrap();
        let b = derive_key("correct horse", &[2u8; SALT_LEN], &test_params()).unwrap();
        assert!(!a.same_key_as(&b).unwrap());
    }

    #[test]
    fn test_unicode_password_normalization() {
        let salt = [9u8; SALT_LEN];
        let composed = derive_key("caf\u{00e9}", &salt, &test_params()).unwrap();
        let decomposed = derive_key("cafe\u{0301}", &salt, &test_params()).unwrap();
        assert!(composed.same_key_as(&decomposed).unwrap());
    }

    #[test]
    fn test_low_cost_rejected() {
        let params = KdfParams {
            log2_n: 4,
            r: 8,
            p: 1,
        };
        let result = derive_key("pw", &[0u8; SALT_LEN], &params);
        assert!(matches!(result, Err(CryptoError::InvalidKdfParams(_))));
    }

    #[test]
    fn test_oversized_params_rejected() {
        for params in [
            KdfParams {
                log2_n: 40,
                r: 8,
                p: 1,
            },
            KdfParams {
                log2_n: 21,
                r: 8,
                p: 1,
            },
            KdfParams {
                log2_n: 20,
                r: 16,
                p: 1,
            },
            KdfParams {
                log2_n: 10,
                r: 0,
                p: 1,
            },
            KdfParams {
                log2_n: 10,
                r: 8,
                p: 1000,
            },
        ] {
            let result = derive_key("pw", &[0u8; SALT_LEN], &params);
            assert!(
                matches!(result, Err(CryptoError::InvalidKdfParams(_))),
                "{params:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_largest_params_accepted() {
        let params = KdfParams {
            log2_n: 20,
            r: 8,
            p: 1,
        };
        assert!(params.to_scrypt().is_ok());
    }

    #[test]
    fn test_generated_salts_differ() {
        let a = generate_salt().unwrap();
        let b = generate_salt().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }
}
