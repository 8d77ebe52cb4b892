//! Vault tuning knobs.
//!
//! `VaultConfig` is plain serde data so a front-end can embed it in its own
//! configuration file (the CLI reads it from the `[vault]` table).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::crypto::KdfParams;
use crate::entry::TitlePolicy;
use crate::vault::password::PasswordPolicy;

/// Default inactivity timeout before an unlocked vault locks itself.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Idle time after which the vault locks, in seconds.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub inactivity_timeout: Duration,

    /// Work factor for newly created credentials.
    ///
    /// Existing credentials keep the parameters they were created with.
    pub kdf: KdfParams,

    pub password_policy: PasswordPolicy,

    pub title_policy: TitlePolicy,

    /// Move straight to `Unlocked` after `set_password`.
    pub unlock_on_create: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            kdf: KdfParams::default(),
            password_policy: PasswordPolicy::default(),
            title_policy: TitlePolicy::default(),
            unlock_on_create: true,
        }
    }
}

impl VaultConfig {
    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    #[must_use]
    pub fn with_title_policy(mut self, policy: TitlePolicy) -> Self {
        self.title_policy = policy;
        self
    }

    #[must_use]
    pub fn with_unlock_on_create(mut self, unlock: bool) -> Self {
        self.unlock_on_create = unlock;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.inactivity_timeout, Duration::from_secs(1800));
        assert!(config.unlock_on_create);
        assert_eq!(config.title_policy, TitlePolicy::Plaintext);
        assert_eq!(config.password_policy.min_length, 8);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"inactivity_timeout": 60, "title_policy": "sealed"}"#)
                .unwrap();
        assert_eq!(config.inactivity_timeout, Duration::from_secs(60));
        assert_eq!(config.title_policy, TitlePolicy::Sealed);
        assert!(config.unlock_on_create);
    }

    #[test]
    fn test_kdf_table() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"kdf": {"log2N": 12, "r": 8, "p": 1}}"#).unwrap();
        assert_eq!(config.kdf.log2_n, 12);
    }
}
