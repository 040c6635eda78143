// Immutable property bag carried alongside rows; updates produce a new map.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropMap {
    inner: Arc<BTreeMap<String, Value>>,
}

impl PropMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inner.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Returns a map with `updates` applied; `self` is left untouched.
    pub fn set<I, K>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut next = (*self.inner).clone();
        for (key, value) in updates {
            next.insert(key.into(), value);
        }
        Self {
            inner: Arc::new(next),
        }
    }

    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        self.set([(key.into(), value)])
    }
}
