use std::sync::{Arc, RwLock};

/// Process-wide Devin API key with an explicit `init` / `clear` lifecycle.
///
/// Cloning shares the same underlying slot, so a key set through the
/// dashboard is immediately visible to every client built from the store.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    key: Arc<RwLock<Option<String>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from configuration. Blank keys count as absent.
    pub fn with_key(key: Option<String>) -> Self {
        let store = Self::new();
        if let Some(key) = key {
            store.init(&key);
        }
        store
    }

    /// Set the key. Returns `false` (and leaves the store untouched) for blank input.
    pub fn init(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        match self.key.write() {
            Ok(mut slot) => {
                *slot = Some(key.to_string());
                true
            }
            Err(poisoned) => {
                *poisoned.into_inner() = Some(key.to_string());
                true
            }
        }
    }

    pub fn clear(&self) {
        match self.key.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn get(&self) -> Option<String> {
        match self.key.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.get().is_some()
    }

    /// Resolve the key for one request: a non-blank override wins over the stored key.
    pub fn resolve(&self, override_key: Option<&str>) -> Option<String> {
        match override_key.map(str::trim) {
            Some(key) if !key.is_empty() => Some(key.to_string()),
            _ => self.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_empty() {
        let store = CredentialStore::new();
        assert!(!store.is_configured());
        assert!(store.get().is_none());
    }

    #[test]
    fn test_init_then_clear() {
        let store = CredentialStore::new();
        assert!(store.init("  apk_user_123  "));
        assert_eq!(store.get().as_deref(), Some("apk_user_123"));
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_blank_key_is_rejected() {
        let store = CredentialStore::with_key(Some("apk_1".into()));
        assert!(!store.init("   "));
        assert_eq!(store.get().as_deref(), Some("apk_1"));
    }

    #[test]
    fn test_with_key_blank_counts_as_absent() {
        let store = CredentialStore::with_key(Some("".into()));
        assert!(!store.is_configured());
    }

    #[test]
    fn test_clones_share_the_slot() {
        let store = CredentialStore::new();
        let other = store.clone();
        store.init("apk_shared");
        assert_eq!(other.get().as_deref(), Some("apk_shared"));
    }

    #[test]
    fn test_resolve_prefers_override() {
        let store = CredentialStore::with_key(Some("apk_stored".into()));
        assert_eq!(store.resolve(Some("apk_header")).as_deref(), Some("apk_header"));
        assert_eq!(store.resolve(Some("  ")).as_deref(), Some("apk_stored"));
        assert_eq!(store.resolve(None).as_deref(), Some("apk_stored"));
        store.clear();
        assert!(store.resolve(None).is_none());
    }
}
