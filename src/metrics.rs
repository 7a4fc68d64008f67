//! Named runtime values for the `/debug/vars` endpoint.
//!
//! Each entry is a producer evaluated on every read, so scrapes always see
//! live values. A single [`Registry`] is built at startup and passed to
//! whatever exposes it.

use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::config::Database;
use crate::constants::VERSION;

type Producer = Box<dyn Fn() -> Value + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("metric {0:?} is already registered")]
    Duplicate(String),
}

#[derive(Default)]
pub struct Registry {
    entries: RwLock<BTreeMap<String, Producer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named producer. Names are unique; a second registration fails
    /// and leaves the first producer in place.
    pub fn register<F>(&self, name: impl Into<String>, producer: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        entries.insert(name, Box::new(producer));
        Ok(())
    }

    /// Evaluates a single entry.
    #[allow(dead_code)]
    pub fn read(&self, name: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).map(|producer| producer())
    }

    /// Evaluates every entry, keyed by name.
    pub fn snapshot(&self) -> Value {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let map: Map<String, Value> = entries
            .iter()
            .map(|(name, producer)| (name.clone(), producer()))
            .collect();
        Value::Object(map)
    }

    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }
}

/// Registers the standard process entries: `version`, `tasks`, `database`
/// and `timestamp`.
pub fn register_defaults(
    registry: &Registry,
    db: &Database,
    runtime: Handle,
) -> Result<(), RegistryError> {
    registry.register("version", || json!(VERSION))?;

    registry.register("tasks", move || {
        json!(runtime.metrics().num_alive_tasks())
    })?;

    let db = db.clone();
    registry.register("database", move || {
        serde_json::to_value(db.stats()).unwrap_or(Value::Null)
    })?;

    registry.register("timestamp", || json!(chrono::Utc::now().timestamp()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_register_and_read() {
        let registry = Registry::new();
        registry.register("answer", || json!(42)).unwrap();

        assert_eq!(registry.read("answer"), Some(json!(42)));
        assert_eq!(registry.read("missing"), None);
    }

    #[test]
    fn test_duplicate_name_keeps_first_producer() {
        let registry = Registry::new();
        registry.register("version", || json!("1.0.0")).unwrap();

        let err = registry.register("version", || json!("evil")).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("version".to_string()));
        assert_eq!(err.to_string(), "metric \"version\" is already registered");
        assert_eq!(registry.read("version"), Some(json!("1.0.0")));
        assert_eq!(registry.names(), vec!["version".to_string()]);
    }

    #[test]
    fn test_values_computed_on_every_read() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        registry
            .register("reads", move || json!(counter.fetch_add(1, Ordering::SeqCst) + 1))
            .unwrap();

        assert_eq!(registry.read("reads"), Some(json!(1)));
        assert_eq!(registry.read("reads"), Some(json!(2)));
        assert_eq!(registry.snapshot()["reads"], json!(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_snapshot_contains_all_entries() {
        let registry = Registry::new();
        registry.register("b", || json!(true)).unwrap();
        registry.register("a", || json!({"nested": 1})).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot, json!({"a": {"nested": 1}, "b": true}));
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_empty_snapshot_is_object() {
        assert_eq!(Registry::new().snapshot(), json!({}));
    }
}
