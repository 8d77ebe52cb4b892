//! Configuration file support for the hushvault CLI.
//!
//! Configuration is stored at `~/.config/hushvault/config.toml` (XDG standard)
//! or `~/Library/Application Support/com.hushvault.hushvault/config.toml` on
//! macOS. `HUSHVAULT_CONFIG_DIR` overrides the directory.
//!
//! # Example configuration
//!
//! ```toml
//! [defaults]
//! vault = "/home/user/journal"
//! verbosity = 1
//!
//! [vault]
//! inactivity_timeout = 600
//! title_policy = "sealed"
//!
//! [vault.password_policy]
//! min_length = 12
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hushvault_core::VaultConfig;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "HUSHVAULT_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Default settings applied to all commands
    #[serde(default)]
    pub defaults: Defaults,

    /// Vault tuning passed to the library
    #[serde(default)]
    pub vault: VaultConfig,
}

/// Default settings
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Defaults {
    /// Vault directory used when neither `--vault` nor `HUSHVAULT_DIR` is set
    pub vault: Option<PathBuf>,

    /// Default verbosity level (0-3)
    pub verbosity: Option<u8>,
}

impl Config {
    /// Load configuration from the default path, or return empty config if not found.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

/// Get the configuration directory.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    #[cfg(target_os = "macos")]
    {
        Ok(base_dirs
            .home_dir()
            .join("Library/Application Support/com.hushvault.hushvault"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Ok(base_dirs.config_dir().join("hushvault"))
    }
}

/// Get the path to the configuration file.
pub fn config_path() -> Result<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Platform data directory used when nothing else names a vault.
pub fn default_vault_dir() -> Result<PathBuf> {
    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(base_dirs.data_dir().join("hushvault"))
}

/// Resolve the vault directory: explicit flag/env first, then config, then platform default.
pub fn resolve_vault_dir(explicit: Option<&Path>, config: &Config) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = &config.defaults.vault {
        return Ok(path.clone());
    }
    default_vault_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hushvault_core::TitlePolicy;
    use std::time::Duration;

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.defaults.vault.is_none());
        assert_eq!(config.vault, VaultConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [defaults]
            vault = "/home/user/journal"
            verbosity = 2

            [vault]
            inactivity_timeout = 600
            title_policy = "sealed"
            unlock_on_create = false

            [vault.password_policy]
            min_length = 12
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.defaults.vault,
            Some(PathBuf::from("/home/user/journal"))
        );
        assert_eq!(config.defaults.verbosity, Some(2));
        assert_eq!(config.vault.inactivity_timeout, Duration::from_secs(600));
        assert_eq!(config.vault.title_policy, TitlePolicy::Sealed);
        assert!(!config.vault.unlock_on_create);
        assert_eq!(config.vault.password_policy.min_length, 12);
        assert_eq!(config.vault.password_policy.min_character_classes, 3);
    }

    #[test]
    fn test_explicit_vault_dir_wins() {
        let config: Config = toml::from_str("[defaults]\nvault = \"/from/config\"").unwrap();
        let resolved = resolve_vault_dir(Some(Path::new("/explicit")), &config).unwrap();
        assert_eq!(resolved, PathBuf::from("/explicit"));

        let resolved = resolve_vault_dir(None, &config).unwrap();
        assert_eq!(resolved, PathBuf::from("/from/config"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from(Path::new("/nonexistent/hushvault/config.toml")).unwrap();
        assert!(config.defaults.verbosity.is_none());
    }
}
