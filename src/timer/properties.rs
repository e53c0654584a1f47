//! Per-timer key/value store
//!
//! Callbacks stash state here (the target of a pending resurrect, a retry
//! counter, ...) instead of capturing it. Values are type-erased; reads ask
//! for a concrete type and get `None` on a mismatch.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Mutex;

use super::lock;

type Value = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct PropertyCollection {
    values: Mutex<HashMap<String, Value>>,
}

impl PropertyCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        lock(&self.values).insert(key.into(), Box::new(value));
    }

    /// Clone out the value under `key` if it exists and is a `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Any + Clone,
    {
        lock(&self.values)
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn get_or<T>(&self, key: &str, default: T) -> T
    where
        T: Any + Clone,
    {
        self.get(key).unwrap_or(default)
    }

    /// Returns true if something was removed.
    pub fn remove(&self, key: &str) -> bool {
        lock(&self.values).remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.values).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.values).keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for PropertyCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyCollection")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let props = PropertyCollection::new();
        props.set("target", 42u64);
        props.set("name", String::from("Kelgor"));

        assert_eq!(props.get::<u64>("target"), Some(42));
        assert_eq!(props.get::<String>("name").as_deref(), Some("Kelgor"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_type_mismatch_is_none() {
        let props = PropertyCollection::new();
        props.set("count", 3i32);
        assert_eq!(props.get::<u32>("count"), None);
        assert_eq!(props.get_or::<u32>("count", 9), 9);
        assert_eq!(props.get_or::<i32>("count", 9), 3);
    }

    #[test]
    fn test_overwrite_and_remove() {
        let props = PropertyCollection::new();
        props.set("k", 1i32);
        props.set("k", "two");
        assert_eq!(props.get::<&str>("k"), Some("two"));
        assert_eq!(props.len(), 1);

        assert!(props.remove("k"));
        assert!(!props.remove("k"));
        assert!(props.is_empty());
        assert!(!props.contains("k"));
    }

    #[test]
    fn test_keys_sorted() {
        let props = PropertyCollection::new();
        props.set("b", 1u8);
        props.set("a", 2u8);
        assert_eq!(props.keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
