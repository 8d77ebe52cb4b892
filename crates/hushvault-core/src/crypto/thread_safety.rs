//! Thread safety implementations for `SessionKey`.
//!
//! `MemSafe` holds a raw pointer to its protected page, which suppresses the
//! automatic `Send`/`Sync` impls. The pointer is only dereferenced through
//! `MemSafe::read()`, and every call to that goes through the `RwLock` inside
//! `SessionKey`, so no two threads ever touch the page concurrently. The
//! memory protection syscalls themselves (mlock, mprotect) are thread-safe.

use super::keys::SessionKey;

// SAFETY: all access to the protected page goes through the RwLock in
// SessionKey; the page stays valid regardless of which thread owns the key.
unsafe impl Send for SessionKey {}

// SAFETY: shared access still takes the RwLock write guard before reading,
// so the raw pointer is never dereferenced without exclusive access.
unsafe impl Sync for SessionKey {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_session_key_shared_across_threads() {
        let key = Arc::new(SessionKey::new([9u8; 32]).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let key = Arc::clone(&key);
                thread::spawn(move || key.with_key(|bytes| bytes[0]).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 9);
        }
    }
}
