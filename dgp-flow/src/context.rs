use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{FlowError, Result};

/// Key/value store shared by every task of one session.
///
/// Values are kept as JSON so that tasks only agree on keys and shapes,
/// never on concrete Rust types. Cloning is cheap and clones see each
/// other's writes.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| FlowError::ContextError(format!("cannot store '{key}': {e}")))?;
        self.data.insert(key, value);
        Ok(())
    }

    /// A value stored under another type reads as missing
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Removes a value and decodes it, consuming it from the session
    pub async fn take<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .remove(key)
            .and_then(|(_, v)| serde_json::from_value(v).ok())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub async fn clear(&self) {
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
