//! Property bag passed from the host into a mounted unit.
//!
//! Values are plain JSON or callbacks. Callbacks are the only way a unit can
//! signal back to the host; nothing else crosses the channel.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

type CallbackFn = dyn Fn(Value) -> Option<Value> + Send + Sync;

/// Host-supplied function a unit may invoke to signal an event.
#[derive(Clone)]
pub struct Callback(Arc<CallbackFn>);

impl Callback {
    #[must_use]
    pub fn new(f: impl Fn(Value) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn invoke(&self, payload: Value) -> Option<Value> {
        (self.0)(payload)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

#[derive(Debug, Clone)]
pub enum PropValue {
    Value(Value),
    Callback(Callback),
}

#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: BTreeMap<String, PropValue>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_callback(
        mut self,
        key: impl Into<String>,
        f: impl Fn(Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.entries
            .insert(key.into(), PropValue::Callback(Callback::new(f)));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries
            .insert(key.into(), PropValue::Value(value.into()));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    /// JSON value under `key`; `None` for absent keys and callbacks.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key) {
            Some(PropValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn callback(&self, key: &str) -> Option<&Callback> {
        match self.entries.get(key) {
            Some(PropValue::Callback(callback)) => Some(callback),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
