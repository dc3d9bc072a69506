//! The reconciling session-state store.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::debug;
use weft_proto::WidgetStates;

use crate::error::StateError;
use crate::id::is_widget_id;
use crate::value::Value;
use crate::widget::{WidgetCallback, WidgetMetadata};
use crate::wstates::WStates;

/// What a widget-producing statement gets back from registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredWidget {
    /// The widget's current value, resolved through the standard
    /// precedence order and cloned for the caller.
    pub value: Value,
    /// True exactly when the value was assigned through the session-state
    /// surface during the current run; the UI layer uses this to force the
    /// frontend's displayed value.
    pub value_changed: bool,
}

/// Session-wide state threaded through every script run.
///
/// Three stores share one dict-like surface:
/// - `new_session_state`: explicit `state[key] = value` writes of the
///   current run,
/// - `new_widget_state`: widget values for the current run, seeded from the
///   frontend snapshot and from widget defaults,
/// - `old_state`: everything that survived previous runs, filled by
///   compaction at each run boundary.
///
/// Lookup precedence is new session value → new widget value (by id) → old
/// value (by id) → old value (by key). The key↔id mapping exists because
/// script code addresses widgets by user key while storage is by id.
#[derive(Debug, Default)]
pub struct SessionState {
    old_state: IndexMap<SmolStr, Value>,
    new_session_state: IndexMap<SmolStr, Value>,
    new_widget_state: WStates,
    key_id_mapping: IndexMap<SmolStr, SmolStr>,
    widgets_this_run: FxHashSet<SmolStr>,
}

impl SessionState {
    /// Fresh, empty session state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate a user key to its widget id; keys without a mapping are
    /// used as-is (they may themselves be widget ids).
    #[must_use]
    pub fn widget_id_for(&self, key: &str) -> SmolStr {
        self.key_id_mapping
            .get(key)
            .cloned()
            .unwrap_or_else(|| SmolStr::new(key))
    }

    /// Read a value through the standard precedence order.
    pub fn get(&mut self, key: &str) -> Result<Value, StateError> {
        if let Some(value) = self.new_session_state.get(key) {
            return Ok(value.clone());
        }
        let id = self.widget_id_for(key);
        if self.new_widget_state.contains_value(&id) {
            return self.new_widget_state.get(&id);
        }
        if let Some(value) = self.old_state.get(&id) {
            return Ok(value.clone());
        }
        if let Some(value) = self.old_state.get(key) {
            return Ok(value.clone());
        }
        Err(StateError::KeyNotFound(SmolStr::new(key)))
    }

    /// Whether a value is visible under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let id = self.widget_id_for(key);
        self.new_session_state.contains_key(key)
            || self.new_widget_state.contains_value(&id)
            || self.old_state.contains_key(&id)
            || self.old_state.contains_key(key)
    }

    /// Assign a value under `key`.
    ///
    /// Fails when `key` addresses a widget that already committed its value
    /// for this run; allowing the write would contradict what the widget
    /// statement already returned to the script.
    pub fn insert(&mut self, key: impl Into<SmolStr>, value: Value) -> Result<(), StateError> {
        let key = key.into();
        let id = self.widget_id_for(&key);
        if self.widgets_this_run.contains(&id) {
            return Err(StateError::WidgetValueCommitted(key));
        }
        self.new_session_state.insert(key, value);
        Ok(())
    }

    /// Remove every trace of `key`.
    pub fn remove(&mut self, key: &str) -> Result<(), StateError> {
        if !self.contains(key) {
            return Err(StateError::KeyNotFound(SmolStr::new(key)));
        }
        let id = self.widget_id_for(key);
        self.new_session_state.shift_remove(key);
        self.new_widget_state.remove(&id);
        self.old_state.shift_remove(&id);
        self.old_state.shift_remove(key);
        self.key_id_mapping.shift_remove(key);
        Ok(())
    }

    /// Register a widget for the current run.
    ///
    /// Stores (and overwrites) metadata, records the key↔id mapping, seeds
    /// the declared default for never-seen widgets, and returns the current
    /// value plus the forced-update flag.
    pub fn register_widget(
        &mut self,
        metadata: WidgetMetadata,
    ) -> Result<RegisteredWidget, StateError> {
        let id = metadata.id.clone();
        if !self.widgets_this_run.insert(id.clone()) {
            return Err(StateError::DuplicateWidgetId {
                kind: metadata.widget_kind.clone(),
                id,
            });
        }

        let user_key = metadata.user_key.clone();
        if let Some(key) = &user_key {
            self.key_id_mapping.insert(key.clone(), id.clone());
        }

        let seen = self.new_widget_state.contains_value(&id)
            || self.old_state.contains_key(&id)
            || user_key.as_ref().is_some_and(|key| {
                self.new_session_state.contains_key(key.as_str())
                    || self.old_state.contains_key(key.as_str())
            });
        let default = metadata.default_value();
        self.new_widget_state.set_metadata(metadata);
        if !seen {
            self.new_widget_state.set_value(id.clone(), default);
        }

        let value_changed = user_key
            .as_ref()
            .is_some_and(|key| self.new_session_state.contains_key(key.as_str()));
        let lookup = user_key.as_deref().unwrap_or(id.as_str());
        let value = self.get(lookup)?;
        Ok(RegisteredWidget {
            value,
            value_changed,
        })
    }

    /// Run-boundary bookkeeping before a new run starts.
    ///
    /// Resets one-shot values, compacts the previous run's state into
    /// `old_state`, loads the frontend snapshot, then fires callbacks of
    /// every widget whose value changed — strictly before the run body, so
    /// callback writes are visible to it.
    pub fn on_script_will_rerun(&mut self, frontend: &WidgetStates) {
        self.reset_triggers();
        self.compact();
        self.widgets_this_run.clear();
        for state in frontend.iter() {
            self.new_widget_state
                .set_from_wire(state.id.clone(), state.value.clone());
        }
        self.call_change_callbacks(frontend);
    }

    /// Run-boundary bookkeeping after a run ends, however it ended.
    ///
    /// `active_ids` are the widget ids registered during the run;
    /// `executed_fragments` the fragment ids the run actually entered;
    /// `fragment_scoped` whether the run was a fragment rerun rather than a
    /// full pass.
    pub fn on_script_finished(
        &mut self,
        active_ids: &FxHashSet<SmolStr>,
        executed_fragments: &FxHashSet<SmolStr>,
        fragment_scoped: bool,
    ) {
        self.reset_triggers();
        self.cull_stale_widgets(active_ids, executed_fragments, fragment_scoped);
    }

    /// Move everything visible into `old_state` and clear the new-state
    /// buffers. Happens exactly once per run boundary.
    fn compact(&mut self) {
        let widget_values = self.new_widget_state.values();
        for (id, value) in widget_values {
            self.old_state.insert(id, value);
        }
        let assigned: Vec<(SmolStr, Value)> = self.new_session_state.drain(..).collect();
        for (key, value) in assigned {
            self.old_state.insert(key, value);
        }
        self.new_widget_state.clear_states();
    }

    /// Reset every trigger-kind value in both old and new stores.
    fn reset_triggers(&mut self) {
        for id in self.new_widget_state.metadata_ids() {
            let Some(metadata) = self.new_widget_state.metadata(&id) else {
                continue;
            };
            if !metadata.is_trigger() {
                continue;
            }
            let empty = metadata.default_value();
            if let Some(slot) = self.old_state.get_mut(&id) {
                *slot = empty;
            }
        }
        self.new_widget_state.reset_triggers();
    }

    /// Fire callbacks for widgets whose frontend value differs from the
    /// previous run's value, in snapshot order.
    fn call_change_callbacks(&mut self, frontend: &WidgetStates) {
        let mut pending: Vec<WidgetCallback> = Vec::new();
        for state in frontend.iter() {
            let Some(metadata) = self.new_widget_state.metadata(&state.id) else {
                continue;
            };
            let Some(callback) = metadata.callback.clone() else {
                continue;
            };
            let Ok(new_value) = self.new_widget_state.get(&state.id) else {
                continue;
            };
            let old_value = self.old_state.get(state.id.as_str());
            if old_value != Some(&new_value) {
                pending.push(callback);
            }
        }
        for callback in pending {
            callback(self);
        }
    }

    /// Garbage-collect widgets that did not appear in this run.
    fn cull_stale_widgets(
        &mut self,
        active_ids: &FxHashSet<SmolStr>,
        executed_fragments: &FxHashSet<SmolStr>,
        fragment_scoped: bool,
    ) {
        let mut candidates: Vec<SmolStr> = self.new_widget_state.metadata_ids();
        for key in self.old_state.keys() {
            if is_widget_id(key) && !candidates.contains(key) {
                candidates.push(key.clone());
            }
        }

        for id in candidates {
            if active_ids.contains(&id) {
                continue;
            }
            let fragment = self
                .new_widget_state
                .metadata(&id)
                .and_then(|meta| meta.fragment_id.clone());
            let cullable = if fragment_scoped {
                // A fragment rerun only owns widgets of the fragments it ran.
                fragment
                    .as_ref()
                    .is_some_and(|f| executed_fragments.contains(f))
            } else {
                // A full run owns everything except widgets of fragments it
                // never entered; those may reappear on a later pass.
                fragment
                    .as_ref()
                    .is_none_or(|f| executed_fragments.contains(f))
            };
            if !cullable {
                continue;
            }
            debug!(widget_id = %id, "culling stale widget state");
            self.new_widget_state.remove(&id);
            self.old_state.shift_remove(&id);
            self.key_id_mapping.retain(|_, mapped| mapped != &id);
        }
    }

    /// A read-only projection of the discoverable session state: user keys
    /// only, never anonymous widgets or generated-id bookkeeping.
    #[must_use]
    pub fn filtered_state(&mut self) -> IndexMap<SmolStr, Value> {
        let mut keys: Vec<SmolStr> = Vec::new();
        for key in self.new_session_state.keys() {
            if !is_widget_id(key) && !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        for key in self.key_id_mapping.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        for key in self.old_state.keys() {
            if !is_widget_id(key) && !keys.contains(key) {
                keys.push(key.clone());
            }
        }

        let mut out = IndexMap::with_capacity(keys.len());
        for key in keys {
            if let Ok(value) = self.get(&key) {
                out.insert(key, value);
            }
        }
        out
    }

    /// Serialize the current widget values into a wire snapshot.
    #[must_use]
    pub fn widget_states_snapshot(&mut self) -> WidgetStates {
        self.new_widget_state.as_widget_states()
    }

    /// Drop everything: explicit session reset.
    pub fn clear(&mut self) {
        self.old_state.clear();
        self.new_session_state.clear();
        self.new_widget_state = WStates::new();
        self.key_id_mapping.clear();
        self.widgets_this_run.clear();
    }

    /// Number of discoverable entries.
    #[must_use]
    pub fn filtered_len(&mut self) -> usize {
        self.filtered_state().len()
    }
}
