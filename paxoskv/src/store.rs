use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory replicated state. Only the learner writes to it; GET reads it
/// directly.
#[derive(Debug, Default)]
pub struct Store {
    map: RwLock<HashMap<String, String>>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        self.map.read().unwrap().get(key).cloned()
    }

    /// Insert or overwrite `key`.
    pub fn put(&self, key: String, value: String) {
        self.map.write().unwrap().insert(key, value);
    }

    /// Remove `key`, returning its previous value.
    pub fn delete(&self, key: &str) -> Option<String> {
        self.map.write().unwrap().remove(key)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.map.read().unwrap().contains_key(key)
    }

    /// Copy of the whole mapping.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.map.read().unwrap().clone()
    }

    /// Replace the whole mapping, used when joining a cluster.
    pub fn replace(&self, snapshot: HashMap<String, String>) {
        *self.map.write().unwrap() = snapshot;
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    /// Whether the store holds no key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all() {
        let store = Store::new();

        assert!(store.get("key1").is_none());
        store.put("key1".into(), "value1".into());
        assert_eq!(store.get("key1"), Some("value1".to_owned()));
        store.put("key1".into(), "value2".into());
        assert_eq!(store.get("key1"), Some("value2".to_owned()));

        assert_eq!(store.delete("key1"), Some("value2".to_owned()));
        assert!(!store.contains("key1"));
        assert!(store.delete("key1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_replace() {
        let a = Store::new();
        a.put("x".into(), "1".into());
        a.put("y".into(), "2".into());

        let b = Store::new();
        b.put("z".into(), "3".into());
        b.replace(a.snapshot());

        assert_eq!(b.len(), 2);
        assert_eq!(b.get("y"), Some("2".to_owned()));
        assert!(!b.contains("z"));
    }
}
