//! Minimum-strength policy applied before a password is accepted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default minimum password length, in characters.
pub const DEFAULT_MIN_LENGTH: usize = 8;

/// Default number of distinct character classes required.
pub const DEFAULT_MIN_CHARACTER_CLASSES: usize = 3;

/// Which policy rule a rejected password failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeakPasswordReason {
    #[error("password must be at least {min} characters long (got {actual})")]
    TooShort { min: usize, actual: usize },

    #[error(
        "password must mix at least {required} of: lowercase, uppercase, digits, symbols (found {found})"
    )]
    TooFewCharacterClasses { required: usize, found: usize },
}

/// Password strength policy.
///
/// Character classes are lowercase letters, uppercase letters, digits, and
/// everything else (symbols, whitespace, non-Latin scripts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub min_character_classes: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            min_character_classes: DEFAULT_MIN_CHARACTER_CLASSES,
        }
    }
}

impl PasswordPolicy {
    /// Check `password` against the policy.
    ///
    /// # Errors
    ///
    /// Returns the first rule the password fails.
    pub fn check(&self, password: &str) -> Result<(), WeakPasswordReason> {
        let length = password.chars().count();
        if length < self.min_length {
            return Err(WeakPasswordReason::TooShort {
                min: self.min_length,
                actual: length,
            });
        }

        let found = character_classes(password);
        if found < self.min_character_classes {
            return Err(WeakPasswordReason::TooFewCharacterClasses {
                required: self.min_character_classes,
                found,
            });
        }

        Ok(())
    }
}

fn character_classes(password: &str) -> usize {
    let (mut lower, mut upper, mut digit, mut other) = (false, false, false, false);
    for c in password.chars() {
        if c.is_lowercase() {
            lower = true;
        } else if c.is_uppercase() {
            upper = true;
        } else if c.is_ascii_digit() {
            digit = true;
        } else {
            other = true;
        }
    }
    [lower, upper, digit, other].into_iter().filter(|b| *b).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_password_rejected() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            policy.check("weakpw"),
            Err(WeakPasswordReason::TooShort { min: 8, actual: 6 })
        );
    }

    #[test]
    fn test_single_class_rejected() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            policy.check("alllowercaseletters"),
            Err(WeakPasswordReason::TooFewCharacterClasses {
                required: 3,
                found: 1
            })
        );
    }

    #[test]
    fn test_strong_passwords_accepted() {
        let policy = PasswordPolicy::default();
        assert!(policy.check("Str0ng!Pass").is_ok());
        assert!(policy.check("Tr0ub4dor&3").is_ok());
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let policy = PasswordPolicy {
            min_length: 8,
            min_character_classes: 1,
        };
        // 4 characters, 10 bytes
        assert!(policy.check("日本語!").is_err());
    }

    #[test]
    fn test_relaxed_policy() {
        let policy = PasswordPolicy {
            min_length: 4,
            min_character_classes: 1,
        };
        assert!(policy.check("abcd").is_ok());
    }
}
