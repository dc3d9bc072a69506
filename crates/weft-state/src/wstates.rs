//! Dual-representation widget state store.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use weft_proto::{WidgetStates, WireValue};

use crate::error::StateError;
use crate::value::Value;
use crate::widget::WidgetMetadata;

/// A widget value as currently held: straight off the wire, or already
/// decoded through the widget's deserializer.
#[derive(Debug, Clone)]
enum Stored {
    Serialized(WireValue),
    Deserialized(Value),
}

/// Widget values keyed by id, decoded lazily through per-widget metadata.
///
/// Values arrive in wire form at the start of a run and are decoded on
/// first read; decoding requires metadata, so reading an id whose widget
/// was never registered fails instead of guessing a codec. Metadata
/// survives [`WStates::clear_states`] on purpose: change callbacks fire
/// before the script re-registers anything and need last run's codecs.
#[derive(Debug, Default, Clone)]
pub struct WStates {
    states: IndexMap<SmolStr, Stored>,
    metadata: FxHashMap<SmolStr, WidgetMetadata>,
}

impl WStates {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace metadata for a widget id.
    pub fn set_metadata(&mut self, metadata: WidgetMetadata) {
        self.metadata.insert(metadata.id.clone(), metadata);
    }

    /// Metadata for an id, if registered.
    #[must_use]
    pub fn metadata(&self, id: &str) -> Option<&WidgetMetadata> {
        self.metadata.get(id)
    }

    /// Whether a value (in either representation) is present for `id`.
    #[must_use]
    pub fn contains_value(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    /// Read a widget's value, decoding and caching wire values on demand.
    pub fn get(&mut self, id: &str) -> Result<Value, StateError> {
        let stored = self
            .states
            .get(id)
            .ok_or_else(|| StateError::KeyNotFound(SmolStr::new(id)))?;
        match stored {
            Stored::Deserialized(value) => Ok(value.clone()),
            Stored::Serialized(wire) => {
                let metadata = self
                    .metadata
                    .get(id)
                    .ok_or_else(|| StateError::MissingMetadata(SmolStr::new(id)))?;
                let value = (metadata.deserializer)(Some(wire));
                self.states
                    .insert(SmolStr::new(id), Stored::Deserialized(value.clone()));
                Ok(value)
            }
        }
    }

    /// Store a frontend-supplied wire value.
    pub fn set_from_wire(&mut self, id: impl Into<SmolStr>, wire: WireValue) {
        self.states.insert(id.into(), Stored::Serialized(wire));
    }

    /// Store an already-decoded value.
    pub fn set_value(&mut self, id: impl Into<SmolStr>, value: Value) {
        self.states.insert(id.into(), Stored::Deserialized(value));
    }

    /// Drop a widget's value and metadata entirely.
    pub fn remove(&mut self, id: &str) {
        self.states.shift_remove(id);
        self.metadata.remove(id);
    }

    /// Drop all values, keeping metadata.
    pub fn clear_states(&mut self) {
        self.states.clear();
    }

    /// Ids with a stored value, in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<SmolStr> {
        self.states.keys().cloned().collect()
    }

    /// Ids with registered metadata.
    #[must_use]
    pub fn metadata_ids(&self) -> Vec<SmolStr> {
        self.metadata.keys().cloned().collect()
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Decode every readable value, in insertion order.
    ///
    /// Ids without metadata are skipped: they belong to widgets the
    /// frontend knows about but this session no longer does.
    #[must_use]
    pub fn values(&mut self) -> IndexMap<SmolStr, Value> {
        let ids = self.ids();
        let mut out = IndexMap::with_capacity(ids.len());
        for id in ids {
            if let Ok(value) = self.get(&id) {
                out.insert(id, value);
            }
        }
        out
    }

    /// Reset every trigger-kind widget to its empty default.
    pub fn reset_triggers(&mut self) {
        let trigger_ids: Vec<SmolStr> = self
            .states
            .keys()
            .filter(|id| {
                self.metadata
                    .get(id.as_str())
                    .is_some_and(WidgetMetadata::is_trigger)
            })
            .cloned()
            .collect();
        for id in trigger_ids {
            let empty = self
                .metadata
                .get(&id)
                .map(WidgetMetadata::default_value)
                .unwrap_or_default();
            self.states.insert(id, Stored::Deserialized(empty));
        }
    }

    /// Serialize everything back into a wire snapshot.
    ///
    /// Used to seed an engine-initiated rerun from current session state.
    /// Trigger-kind widgets are left out: a one-shot value in a snapshot
    /// would replay the press into the next run, and only the frontend may
    /// assert a press.
    #[must_use]
    pub fn as_widget_states(&mut self) -> WidgetStates {
        let ids = self.ids();
        let mut snapshot = WidgetStates::new();
        for id in ids {
            let Some(metadata) = self.metadata.get(&id) else {
                continue;
            };
            if metadata.is_trigger() {
                continue;
            }
            let serializer = metadata.serializer.clone();
            if let Ok(value) = self.get(&id) {
                snapshot.set(id, serializer(&value));
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_proto::WidgetValueKind;

    fn meta(id: &str, kind: WidgetValueKind, default: Value) -> WidgetMetadata {
        WidgetMetadata::new(id, "test_widget", kind, default)
    }

    #[test]
    fn wire_values_decode_through_metadata() {
        let mut states = WStates::new();
        states.set_metadata(meta("w", WidgetValueKind::Int, Value::Int(0)));
        states.set_from_wire("w", WireValue::Int(9));
        assert_eq!(states.get("w").unwrap(), Value::Int(9));
        // Second read hits the cached decoded value.
        assert_eq!(states.get("w").unwrap(), Value::Int(9));
    }

    #[test]
    fn missing_metadata_fails_decode() {
        let mut states = WStates::new();
        states.set_from_wire("ghost", WireValue::Int(1));
        assert!(matches!(
            states.get("ghost"),
            Err(StateError::MissingMetadata(_))
        ));
    }

    #[test]
    fn reset_triggers_only_touches_trigger_kinds() {
        let mut states = WStates::new();
        states.set_metadata(meta("b", WidgetValueKind::Trigger, Value::Null));
        states.set_metadata(meta("n", WidgetValueKind::Int, Value::Int(0)));
        states.set_value("b", Value::Bool(true));
        states.set_value("n", Value::Int(5));

        states.reset_triggers();

        assert_eq!(states.get("b").unwrap(), Value::Bool(false));
        assert_eq!(states.get("n").unwrap(), Value::Int(5));
    }
}
