//! Password acquisition for encrypted documents.
//!
//! Historically "the current password" was process-global mutable state set by
//! the caller just before opening a document. The session instead accepts a
//! provider capability at construction and reads it at context-build time —
//! never earlier — so a password set between load attempts is honored.

use std::fmt;
use std::sync::Mutex;

use zeroize::Zeroizing;

/// Source of the password to try when a document turns out to be encrypted.
pub trait PasswordProvider: Send + Sync {
    /// The currently configured password, or `None` to fall back to the
    /// format's default password.
    fn current_password(&self) -> Option<String>;
}

/// A provider with no configured password; encrypted documents are attempted
/// with the default password only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPassword;

impl PasswordProvider for NoPassword {
    fn current_password(&self) -> Option<String> {
        None
    }
}

/// Shared mutable password configuration.
///
/// A caller keeps one store, hands it (via `Arc`) to the sessions it opens, and
/// may change the password between attempts — typically after a
/// `WrongPassword` failure prompted the user for a new one.
#[derive(Default)]
pub struct PasswordStore {
    current: Mutex<Option<Zeroizing<String>>>,
}

impl PasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configured password; `None` clears it. The previous value is
    /// wiped on drop.
    pub fn set_password(&self, password: Option<&str>) {
        let mut slot = self.current.lock().expect("password store poisoned");
        *slot = password.map(|p| Zeroizing::new(p.to_string()));
    }
}

impl PasswordProvider for PasswordStore {
    fn current_password(&self) -> Option<String> {
        let slot = self.current.lock().expect("password store poisoned");
        slot.as_ref().map(|p| p.as_str().to_string())
    }
}

impl fmt::Debug for PasswordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let configured = self
            .current
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        // The password itself is deliberately not printed.
        f.debug_struct("PasswordStore")
            .field("configured", &configured)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_starts_empty_and_is_mutable() {
        let store = PasswordStore::new();
        assert_eq!(store.current_password(), None);

        store.set_password(Some("secret"));
        assert_eq!(store.current_password().as_deref(), Some("secret"));

        store.set_password(Some("other"));
        assert_eq!(store.current_password().as_deref(), Some("other"));

        store.set_password(None);
        assert_eq!(store.current_password(), None);
    }

    #[test]
    fn debug_output_does_not_leak_the_password() {
        let store = PasswordStore::new();
        store.set_password(Some("hunter2"));
        let debug = format!("{store:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("configured"));
    }

    #[test]
    fn no_password_provider_is_always_absent() {
        assert_eq!(NoPassword.current_password(), None);
    }
}
