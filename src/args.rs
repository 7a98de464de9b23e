// src/args.rs

//! Run arguments: a read-only keyed map fixed for the lifetime of one
//! top-level invocation, readable from any task body and from section
//! selectors.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// Immutable argument map for one invocation. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    values: Arc<BTreeMap<String, Value>>,
}

impl RunArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RunArgsBuilder {
        RunArgsBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Builder used at the top-level invocation; values are serialized once and
/// frozen behind an `Arc`.
#[derive(Debug, Default)]
pub struct RunArgsBuilder {
    values: BTreeMap<String, Value>,
}

impl RunArgsBuilder {
    /// Add one argument. Values that fail to serialize become `null`.
    pub fn arg(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.values.insert(key.into(), value);
        self
    }

    pub fn build(self) -> RunArgs {
        RunArgs {
            values: Arc::new(self.values),
        }
    }
}
