use dashmap::DashMap;
use serde_json::Value;

/// Read-model mirror of everything the Storage Façade has persisted.
/// Reads are lock-free; writes are restricted to the façade so that the
/// cache can never drift from what's durably stored under a namespace.
#[derive(Default)]
pub struct StateCache {
    entries: DashMap<String, Value>,
}

fn state_key(namespace: &str, key: &str) -> String {
    format!("{namespace}.{key}")
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.entries.get(&state_key(namespace, key)).map(|v| v.clone())
    }

    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.entries.contains_key(&state_key(namespace, key))
    }

    pub fn keys_in_namespace(&self, namespace: &str) -> Vec<String> {
        let prefix = format!("{namespace}.");
        self.entries
            .iter()
            .filter_map(|entry| entry.key().strip_prefix(&prefix).map(|k| k.to_string()))
            .collect()
    }

    /// Only `kestrel_storage::Facade` calls this, immediately after a
    /// successful backend write.
    pub(crate) fn apply_storage_write(&self, namespace: &str, key: &str, value: Value) {
        self.entries.insert(state_key(namespace, key), value);
    }

    pub(crate) fn apply_storage_delete(&self, namespace: &str, key: &str) {
        self.entries.remove(&state_key(namespace, key));
    }
}

/// Gives `kestrel-storage` access to the restricted write path without
/// making it part of the public API surface other crates can call.
pub trait StateCacheWriter {
    fn write(&self, namespace: &str, key: &str, value: Value);
    fn delete(&self, namespace: &str, key: &str);
}

impl StateCacheWriter for StateCache {
    fn write(&self, namespace: &str, key: &str, value: Value) {
        self.apply_storage_write(namespace, key, value);
    }

    fn delete(&self, namespace: &str, key: &str) {
        self.apply_storage_delete(namespace, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let cache = StateCache::new();
        cache.write("lighting", "kitchen.on", serde_json::json!(true));
        assert_eq!(cache.get("lighting", "kitchen.on"), Some(serde_json::json!(true)));
    }

    #[test]
    fn missing_key_reads_none() {
        let cache = StateCache::new();
        assert_eq!(cache.get("lighting", "missing"), None);
    }

    #[test]
    fn delete_removes_entry() {
        let cache = StateCache::new();
        cache.write("lighting", "kitchen.on", serde_json::json!(true));
        cache.delete("lighting", "kitchen.on");
        assert!(!cache.contains("lighting", "kitchen.on"));
    }

    #[test]
    fn keys_in_namespace_are_scoped() {
        let cache = StateCache::new();
        cache.write("lighting", "a", serde_json::json!(1));
        cache.write("lighting", "b", serde_json::json!(2));
        cache.write("climate", "a", serde_json::json!(3));

        let mut keys = cache.keys_in_namespace("lighting");
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
