//! Widget metadata and value codecs.

use std::sync::Arc;

use smol_str::SmolStr;
use weft_proto::{WidgetValueKind, WireValue};

use crate::session_state::SessionState;
use crate::value::Value;

/// Converts a wire value (or its absence) into the application value.
///
/// `None` input means "the widget has never been interacted with" and must
/// yield the widget's declared default.
pub type Deserializer = Arc<dyn Fn(Option<&WireValue>) -> Value + Send + Sync>;

/// Converts an application value back into wire form.
pub type Serializer = Arc<dyn Fn(&Value) -> WireValue + Send + Sync>;

/// User code to invoke when a widget's value changed between runs.
///
/// Receives the session state directly; callbacks never reach for an
/// ambient handle, so their writes are trivially visible to the run body
/// that follows.
pub type WidgetCallback = Arc<dyn Fn(&mut SessionState) + Send + Sync>;

/// Per-widget identity, codec and callback bindings.
///
/// Created fresh every time the owning widget statement executes; the
/// latest metadata for an id always replaces the previous one.
#[derive(Clone)]
pub struct WidgetMetadata {
    /// Stable widget identity.
    pub id: SmolStr,
    /// Widget kind name, used in diagnostics (`"button"`, `"slider"`, ...).
    pub widget_kind: SmolStr,
    /// Optional user-assigned key.
    pub user_key: Option<SmolStr>,
    /// Which wire variant carries this widget's value.
    pub value_kind: WidgetValueKind,
    /// Wire-to-value conversion.
    pub deserializer: Deserializer,
    /// Value-to-wire conversion.
    pub serializer: Serializer,
    /// Invoked before the run body when the value changed between runs.
    pub callback: Option<WidgetCallback>,
    /// When set, the widget belongs to this fragment's subtree.
    pub fragment_id: Option<SmolStr>,
}

impl std::fmt::Debug for WidgetMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetMetadata")
            .field("id", &self.id)
            .field("widget_kind", &self.widget_kind)
            .field("user_key", &self.user_key)
            .field("value_kind", &self.value_kind)
            .field("has_callback", &self.callback.is_some())
            .field("fragment_id", &self.fragment_id)
            .finish()
    }
}

impl WidgetMetadata {
    /// Metadata with the default codec for `value_kind` and the given
    /// declared default.
    ///
    /// Trigger kinds ignore `default` and always default to their empty
    /// value, which makes trigger reset and default seeding one code path.
    #[must_use]
    pub fn new(
        id: impl Into<SmolStr>,
        widget_kind: impl Into<SmolStr>,
        value_kind: WidgetValueKind,
        default: Value,
    ) -> Self {
        let default = if value_kind.is_trigger() {
            wire_to_value(&WireValue::empty(value_kind))
        } else {
            default
        };
        Self {
            id: id.into(),
            widget_kind: widget_kind.into(),
            user_key: None,
            value_kind,
            deserializer: default_deserializer(value_kind, default),
            serializer: default_serializer(value_kind),
            callback: None,
            fragment_id: None,
        }
    }

    /// Attach a user key.
    #[must_use]
    pub fn with_key(mut self, key: Option<impl Into<SmolStr>>) -> Self {
        self.user_key = key.map(Into::into);
        self
    }

    /// Attach a change callback.
    #[must_use]
    pub fn with_callback(mut self, callback: WidgetCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Scope the widget to a fragment.
    #[must_use]
    pub fn with_fragment(mut self, fragment_id: Option<impl Into<SmolStr>>) -> Self {
        self.fragment_id = fragment_id.map(Into::into);
        self
    }

    /// Whether this widget's value is one-shot.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.value_kind.is_trigger()
    }

    /// The widget's declared default, i.e. `deserializer(None)`.
    #[must_use]
    pub fn default_value(&self) -> Value {
        (self.deserializer)(None)
    }
}

/// The standard deserializer: decode by kind, fall back to the declared
/// default when the frontend never supplied a value.
fn default_deserializer(kind: WidgetValueKind, default: Value) -> Deserializer {
    Arc::new(move |wire| match wire {
        Some(wire) => wire_to_value(wire),
        None => {
            if kind.is_trigger() {
                wire_to_value(&WireValue::empty(kind))
            } else {
                default.clone()
            }
        }
    })
}

/// The standard serializer: encode into the widget's wire kind.
fn default_serializer(kind: WidgetValueKind) -> Serializer {
    Arc::new(move |value| value_to_wire(kind, value))
}

/// Decode a wire value into its application form.
#[must_use]
pub fn wire_to_value(wire: &WireValue) -> Value {
    match wire {
        WireValue::Bool(value) | WireValue::Trigger(value) => Value::Bool(*value),
        WireValue::Int(value) => Value::Int(*value),
        WireValue::Double(value) => Value::Double(*value),
        WireValue::String(value) => Value::String(value.clone()),
        WireValue::StringTrigger(value) => match value {
            Some(text) => Value::String(text.clone()),
            None => Value::Null,
        },
        WireValue::IntList(values) => Value::IntList(values.clone()),
        WireValue::DoubleList(values) => Value::DoubleList(values.clone()),
        WireValue::StringList(values) => Value::StringList(values.clone()),
        WireValue::Json(value) => Value::Json(value.clone()),
        WireValue::Bytes(bytes) => Value::Bytes(bytes.clone()),
    }
}

/// Encode an application value into the given wire kind.
///
/// A value that does not fit the kind encodes as the kind's empty default;
/// widgets only ever store values their own deserializer produced, so the
/// fallback is a guard, not a conversion path.
#[must_use]
pub fn value_to_wire(kind: WidgetValueKind, value: &Value) -> WireValue {
    match (kind, value) {
        (WidgetValueKind::Bool, Value::Bool(value)) => WireValue::Bool(*value),
        (WidgetValueKind::Trigger, Value::Bool(value)) => WireValue::Trigger(*value),
        (WidgetValueKind::Int, Value::Int(value)) => WireValue::Int(*value),
        (WidgetValueKind::Double, Value::Double(value)) => WireValue::Double(*value),
        (WidgetValueKind::Double, Value::Int(value)) => {
            #[allow(clippy::cast_precision_loss)]
            WireValue::Double(*value as f64)
        }
        (WidgetValueKind::String, Value::String(value)) => WireValue::String(value.clone()),
        (WidgetValueKind::StringTrigger, Value::String(value)) => {
            WireValue::StringTrigger(Some(value.clone()))
        }
        (WidgetValueKind::StringTrigger, Value::Null) => WireValue::StringTrigger(None),
        (WidgetValueKind::IntList, Value::IntList(values)) => WireValue::IntList(values.clone()),
        (WidgetValueKind::DoubleList, Value::DoubleList(values)) => {
            WireValue::DoubleList(values.clone())
        }
        (WidgetValueKind::StringList, Value::StringList(values)) => {
            WireValue::StringList(values.clone())
        }
        (WidgetValueKind::Json, Value::Json(value)) => WireValue::Json(value.clone()),
        (WidgetValueKind::Bytes, Value::Bytes(bytes)) => WireValue::Bytes(bytes.clone()),
        (kind, _) => WireValue::empty(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips() {
        let cases = [
            (WidgetValueKind::Bool, Value::Bool(true)),
            (WidgetValueKind::Int, Value::Int(-7)),
            (WidgetValueKind::Double, Value::Double(2.5)),
            (WidgetValueKind::String, Value::String("hi".to_string())),
            (WidgetValueKind::IntList, Value::IntList(vec![1, 2, 3])),
            (
                WidgetValueKind::StringList,
                Value::StringList(vec!["a".to_string()]),
            ),
            (WidgetValueKind::Bytes, Value::Bytes(vec![1, 2])),
        ];
        for (kind, value) in cases {
            let wire = value_to_wire(kind, &value);
            assert_eq!(wire_to_value(&wire), value, "kind {kind:?}");
        }
    }

    #[test]
    fn trigger_default_is_empty_regardless_of_declared_default() {
        let meta = WidgetMetadata::new("id", "button", WidgetValueKind::Trigger, Value::Bool(true));
        assert_eq!(meta.default_value(), Value::Bool(false));
    }

    #[test]
    fn declared_default_survives_missing_wire_value() {
        let meta = WidgetMetadata::new("id", "number_input", WidgetValueKind::Int, Value::Int(42));
        assert_eq!(meta.default_value(), Value::Int(42));
        assert_eq!(
            (meta.deserializer)(Some(&WireValue::Int(5))),
            Value::Int(5)
        );
    }
}
