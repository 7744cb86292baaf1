//! The variable environment.
//!
//! A name to [`Value`] mapping shared by protocol handlers and script
//! execution. It is passed by reference to everything that touches it;
//! there is no process-wide instance.

mod value;

pub use value::{Value, ValueKind};

use serde::Serialize;
use std::collections::BTreeMap;

/// Name and type tag of one environment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

/// Mutable name to value mapping.
///
/// Entries live until overwritten or removed; there is no eviction.
#[derive(Debug, Default)]
pub struct Environment {
    entries: BTreeMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Unconditionally store `value` under `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Every entry with its type tag, ordered by name.
    pub fn list(&self) -> Vec<VariableInfo> {
        self.entries
            .iter()
            .map(|(name, value)| VariableInfo {
                name: name.clone(),
                type_tag: value.type_tag().to_string(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_overwrites_without_type_check() {
        let mut env = Environment::new();
        env.set("x", json!(1));
        env.set("x", json!("now a string"));
        assert_eq!(env.get("x").unwrap().type_tag(), "str");
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_absent_variable() {
        let env = Environment::new();
        assert!(env.get("zz").is_none());
        assert!(!env.is_set("zz"));
    }

    #[test]
    fn test_list_is_stable() {
        let mut env = Environment::new();
        env.set("b", json!(2.5));
        env.set("a", json!([1]));
        let first = env.list();
        assert_eq!(first, env.list());
        assert_eq!(first[0].name, "a");
        assert_eq!(first[0].type_tag, "list");
        assert_eq!(
            serde_json::to_value(&first[1]).unwrap(),
            json!({"name": "b", "type": "float"})
        );
    }

    #[test]
    fn test_remove() {
        let mut env = Environment::new();
        env.set("x", json!(true));
        assert!(env.remove("x").is_some());
        assert!(env.is_empty());
    }
}
