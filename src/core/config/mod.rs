#![allow(clippy::result_large_err)]

pub mod formatter;
pub mod loader;
pub mod search;

pub use loader::{merge_values, ConfigLoader, ConfigSources, LoadedConfig};
pub use search::SearchRequest;

use crate::core::error::{codes, AppError};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Sections probed, in order, when a key is not addressed absolutely.
pub const DEFAULT_SEARCH_ORDER: [&str; 8] = [
    "cmdline", "computed", "operator", "payload", "cluster", "task", "site", "cloud",
];

/// Section holding values derived while loading (timestamps, paths).
pub const COMPUTED_SECTION: &str = "computed";

/// Section holding command-line overrides.
pub const CMDLINE_SECTION: &str = "cmdline";

/// Layered, hierarchical run configuration.
///
/// The store is built once by [`ConfigLoader`]. Writes go through `&mut self`,
/// so computed keys are always in place before assembly borrows the store for
/// reading.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: Map<String, Value>,
    search_order: Vec<String>,
    env: HashMap<String, String>,
}

impl ConfigStore {
    /// Build a store from a mapping, capturing the current process environment.
    pub fn new(root: Value, search_order: Vec<String>) -> Result<Self, AppError> {
        let Value::Object(root) = root else {
            return Err(AppError::configuration(
                codes::INVALID_SOURCE,
                "configuration root must be a mapping",
            ));
        };
        Ok(Self {
            root,
            search_order,
            env: std::env::vars().collect(),
        })
    }

    pub fn with_default_order(root: Value) -> Result<Self, AppError> {
        Self::new(
            root,
            DEFAULT_SEARCH_ORDER.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Replace the environment snapshot used for `${VAR}` expansion.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn search_order(&self) -> &[String] {
        &self.search_order
    }

    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.root.get(name).and_then(Value::as_object)
    }

    /// Exact lookup of a dotted path; a leading `.` is optional.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = split_path(path);
        let first = parts.next()?;
        let mut current = self.root.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Write a dotted path, creating intermediate mappings as needed.
    pub fn set(&mut self, path: &str, value: Value) {
        let parts: Vec<&str> = split_path(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };
        let mut current = &mut self.root;
        for part in parents {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }

    /// Copy of this store with extra root-level keys.
    pub fn snapshot_with(&self, extra: &[(&str, Value)]) -> ConfigStore {
        let mut copy = self.clone();
        for (key, value) in extra {
            copy.root.insert(key.to_string(), value.clone());
        }
        copy
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|part| !part.is_empty())
}
