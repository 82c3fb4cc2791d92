//! Ordered TXT-style attribute tables.

use std::collections::HashMap;

/// Key/value pairs of one scope, kept in insertion order.
///
/// Setting an existing key overwrites its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (key, value) in iter {
            attributes.set(key, value);
        }
        attributes
    }
}

/// Attribute scopes of a session: the local scope (`""`) plus one scope per
/// discovered instance.
#[derive(Debug, Default)]
pub struct AttributeStore {
    local: Attributes,
    remote: HashMap<String, Attributes>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(&self) -> &Attributes {
        &self.local
    }

    pub fn set_local(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.local.set(key, value);
    }

    /// Scope for `instance`, `""` meaning local
    pub fn scope(&self, instance: &str) -> Option<&Attributes> {
        if instance.is_empty() {
            Some(&self.local)
        } else {
            self.remote.get(instance)
        }
    }

    /// Overwrite a value in an existing scope. Unknown remote scopes are left alone.
    pub fn set_in(&mut self, instance: &str, key: impl Into<String>, value: impl Into<String>) -> bool {
        if instance.is_empty() {
            self.local.set(key, value);
            return true;
        }
        match self.remote.get_mut(instance) {
            Some(scope) => {
                scope.set(key, value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, instance: &str, key: &str) -> Option<&str> {
        self.scope(instance)?.get(key)
    }

    /// Create an empty remote scope if none exists yet
    pub fn ensure_remote(&mut self, instance: &str) {
        self.remote.entry(instance.to_string()).or_default();
    }

    /// Replace a remote scope wholesale with freshly resolved data
    pub fn replace_remote(&mut self, instance: &str, attributes: Attributes) {
        self.remote.insert(instance.to_string(), attributes);
    }

    pub fn remove_remote(&mut self, instance: &str) {
        self.remote.remove(instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites_in_place() {
        let mut attrs = Attributes::new();
        attrs.set("priority", "1");
        attrs.set("UUID", "abc");
        attrs.set("priority", "2");

        assert_eq!(attrs.get("priority"), Some("2"));
        assert_eq!(attrs.keys().collect::<Vec<_>>(), vec!["priority", "UUID"]);
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_empty_value_is_present() {
        let mut attrs = Attributes::new();
        attrs.set("flag", "");
        assert!(attrs.contains_key("flag"));
        assert_eq!(attrs.get("flag"), Some(""));
    }

    #[test]
    fn test_from_iter_dedups_keys() {
        let attrs: Attributes = [("a", "1"), ("b", "2"), ("a", "3")].into_iter().collect();
        assert_eq!(attrs.iter().collect::<Vec<_>>(), vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_scopes_are_independent() {
        let mut store = AttributeStore::new();
        store.set_local("k", "local");
        store.replace_remote("one", [("k", "1")].into_iter().collect());
        store.replace_remote("two", Attributes::new());

        assert_eq!(store.get("", "k"), Some("local"));
        assert_eq!(store.get("one", "k"), Some("1"));
        assert_eq!(store.get("two", "k"), None);
        assert_eq!(store.get("three", "k"), None);
    }

    #[test]
    fn test_set_in_unknown_scope_ignored() {
        let mut store = AttributeStore::new();
        assert!(!store.set_in("ghost", "k", "v"));
        assert!(store.scope("ghost").is_none());

        store.ensure_remote("real");
        assert!(store.set_in("real", "k", "v"));
        assert_eq!(store.get("real", "k"), Some("v"));

        store.remove_remote("real");
        assert_eq!(store.get("real", "k"), None);
    }

    #[test]
    fn test_ensure_remote_keeps_existing() {
        let mut store = AttributeStore::new();
        store.replace_remote("one", [("k", "1")].into_iter().collect());
        store.ensure_remote("one");
        assert_eq!(store.get("one", "k"), Some("1"));
    }
}
