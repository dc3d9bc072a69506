//! Memoized function-result store.
//!
//! The collaborator behind caching decorators: a plain keyed store, not
//! part of the rerun scheduler. Shared across a runtime's sessions and
//! cleared wholesale by the clear-cache message.

use std::sync::Mutex;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use weft_state::Value;

/// Process-wide memoization store.
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: Mutex<FxHashMap<SmolStr, Value>>,
}

impl MemoCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Store a value.
    pub fn insert(&self, key: impl Into<SmolStr>, value: Value) {
        self.lock().insert(key.into(), value);
    }

    /// Return the cached value, computing and storing it on a miss.
    pub fn get_or_insert_with(&self, key: &str, compute: impl FnOnce() -> Value) -> Value {
        let mut entries = self.lock();
        if let Some(value) = entries.get(key) {
            return value.clone();
        }
        let value = compute();
        entries.insert(SmolStr::new(key), value.clone());
        value
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<SmolStr, Value>> {
        self.entries.lock().expect("memo cache lock poisoned")
    }
}
