#![forbid(unsafe_code)]

use std::fmt;
use std::sync::RwLock;
use std::time::{Instant, SystemTime};

use memsafe::MemSafe;
use thiserror::Error;

/// Length of a session key in bytes (AES-256).
pub const SESSION_KEY_LEN: usize = 32;

/// Error type for key access operations.
///
/// This error can occur when accessing protected key material, either due to
/// memory protection failures or lock poisoning (a thread panicked while holding the lock).
#[derive(Debug, Error)]
pub enum KeyAccessError {
    /// Memory protection operation failed (mlock, mprotect, etc.)
    #[error("Memory protection operation failed: {0}")]
    MemoryProtection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Lock was poisoned (a thread panicked while holding it)
    #[error("Key lock was poisoned")]
    LockPoisoned,
}

impl KeyAccessError {
    /// Create a memory protection error from any error type.
    pub fn memory_protection<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        KeyAccessError::MemoryProtection(Box::new(err))
    }
}

/// Symmetric key derived from the vault password, alive for one unlocked session.
///
/// # Security
///
/// The key bytes live in a `memsafe::MemSafe` container:
/// - **Memory locking**: pinned in RAM via `mlock`, never swapped to disk
/// - **Access control**: `mprotect(PROT_NONE)` while not being read
/// - **Dump exclusion**: `MADV_DONTDUMP` on Linux
/// - **Zeroization**: wiped when the key is dropped
///
/// There is no serialization and no `Clone`. The vault shares a session key with
/// in-flight operations through `Arc`; once the vault locks and the last
/// operation finishes, the key is dropped and wiped.
///
/// Key bytes are only reachable through [`SessionKey::with_key`], which keeps the
/// material inside a callback scope.
pub struct SessionKey {
    key: RwLock<MemSafe<[u8; SESSION_KEY_LEN]>>,
    derived_at: SystemTime,
    derived_instant: Instant,
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("key", &"[REDACTED]")
            .field("derived_at", &self.derived_at)
            .finish()
    }
}

impl SessionKey {
    /// Wrap freshly derived key material.
    ///
    /// The caller is responsible for zeroing its own copy of `key`; use a
    /// `Zeroizing` buffer on the derivation side.
    ///
    /// # Errors
    ///
    /// Returns a `KeyAccessError` if memory protection initialization fails,
    /// for example when the process mlock limit is exhausted.
    pub fn new(key: [u8; SESSION_KEY_LEN]) -> Result<Self, KeyAccessError> {
        Ok(SessionKey {
            key: RwLock::new(MemSafe::new(key).map_err(KeyAccessError::memory_protection)?),
            derived_at: SystemTime::now(),
            derived_instant: Instant::now(),
        })
    }

    /// Wall-clock time at which this key was derived.
    pub fn derived_at(&self) -> SystemTime {
        self.derived_at
    }

    /// Monotonic age of this key.
    pub fn age(&self) -> std::time::Duration {
        self.derived_instant.elapsed()
    }

    /// Execute a function with access to the raw 256-bit key.
    ///
    /// Memory permissions are elevated only for the duration of the callback.
    /// The callback cannot hold on to the reference.
    ///
    /// # Errors
    ///
    /// Returns a `KeyAccessError` if the lock is poisoned or if
    /// memory protection operations fail.
    ///
    /// # Example
    ///
    /// ```
    /// # use hushvault_core::crypto::keys::SessionKey;
    /// let key = SessionKey::new([7u8; 32]).unwrap();
    /// let len = key.with_key(|bytes| bytes.len()).unwrap();
    /// assert_eq!(len, 32);
    /// ```
    pub fn with_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; SESSION_KEY_LEN]) -> R,
    {
        let mut lock = self.key.write().map_err(|_| KeyAccessError::LockPoisoned)?;
        let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
        Ok(f(&guard))
    }

    /// Compare two keys without exposing either outside a callback scope.
    ///
    /// Intended for tests and diagnostics; the comparison is constant-time.
    pub fn same_key_as(&self, other: &SessionKey) -> Result<bool, KeyAccessError> {
        use subtle::ConstantTimeEq;

        // Both read guards would come from the same lock.
        if std::ptr::eq(self, other) {
            return Ok(true);
        }
        self.with_key(|a| other.with_key(|b| bool::from(a.ct_eq(b))))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_access() {
        let key = SessionKey::new([3u8; 32]).unwrap();
        let sum = key
            .with_key(|bytes| bytes.iter().map(|b| u32::from(*b)).sum::<u32>())
            .unwrap();
        assert_eq!(sum, 96);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SessionKey::new([0xAB; 32]).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171, 171"));
    }

    #[test]
    fn test_same_key_as() {
        let a = SessionKey::new([1u8; 32]).unwrap();
        let b = SessionKey::new([1u8; 32]).unwrap();
        let c = SessionKey::new([2u8; 32]).unwrap();
        assert!(a.same_key_as(&b).unwrap());
        assert!(!a.same_key_as(&c).unwrap());
        assert!(a.same_key_as(&a).unwrap());
    }
}
