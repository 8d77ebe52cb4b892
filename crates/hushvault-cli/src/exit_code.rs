//! Exit codes for the CLI.
//!
//! These follow common Unix conventions and provide meaningful
//! status information for scripting and automation.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments, vault already initialized)
pub const USAGE_ERROR: u8 = 2;

/// Authentication failed (incorrect password)
pub const AUTH_FAILED: u8 = 3;

/// Vault missing, uninitialized, or its document is corrupt
pub const VAULT_INVALID: u8 = 4;

/// Permission denied on the vault directory or document
pub const PERMISSION_DENIED: u8 = 5;

/// An entry failed authentication (tampered or wrong key)
pub const INTEGRITY_FAILED: u8 = 6;

/// Entry not found
pub const NOT_FOUND: u8 = 7;

/// Operation cancelled by the user
pub const CANCELLED: u8 = 8;

/// New password rejected by the password policy
pub const WEAK_PASSWORD: u8 = 9;
