//! API-key allow list

use std::collections::HashSet;

use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct ApiKeyStore {
    keys: RwLock<HashSet<String>>,
}

impl ApiKeyStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: RwLock::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.keys.read().contains(key)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        let store = ApiKeyStore::new(["API_KEY_12345"]);
        assert!(store.is_valid("API_KEY_12345"));
        assert!(!store.is_valid("API_KEY_00000"));
        assert!(!store.is_valid(""));
        assert!(!store.is_valid("api_key_12345"));
    }
}
