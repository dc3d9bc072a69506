//! Wire-level widget values.

use serde::{Deserialize, Serialize};

/// Tag identifying which variant of [`WireValue`] carries a widget's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetValueKind {
    /// Boolean value (checkbox, toggle).
    Bool,
    /// Integer value (number input, slider).
    Int,
    /// Floating point value.
    Double,
    /// Text value.
    String,
    /// One-shot boolean (button press).
    Trigger,
    /// One-shot text (chat input).
    StringTrigger,
    /// Integer list (multi-select indices).
    IntList,
    /// Floating point list (range slider).
    DoubleList,
    /// Text list.
    StringList,
    /// Arbitrary JSON payload.
    Json,
    /// Raw bytes (file contents).
    Bytes,
}

impl WidgetValueKind {
    /// Whether values of this kind are one-shot and reset at run boundaries.
    #[must_use]
    pub fn is_trigger(self) -> bool {
        matches!(self, Self::Trigger | Self::StringTrigger)
    }
}

/// A widget value in its wire representation.
///
/// The finite set of value kinds a widget can carry. Every consumer matches
/// exhaustively; adding a kind is a compile-visible change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum WireValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Trigger(bool),
    StringTrigger(Option<String>),
    IntList(Vec<i64>),
    DoubleList(Vec<f64>),
    StringList(Vec<String>),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl WireValue {
    /// The kind tag for this value.
    #[must_use]
    pub fn kind(&self) -> WidgetValueKind {
        match self {
            Self::Bool(_) => WidgetValueKind::Bool,
            Self::Int(_) => WidgetValueKind::Int,
            Self::Double(_) => WidgetValueKind::Double,
            Self::String(_) => WidgetValueKind::String,
            Self::Trigger(_) => WidgetValueKind::Trigger,
            Self::StringTrigger(_) => WidgetValueKind::StringTrigger,
            Self::IntList(_) => WidgetValueKind::IntList,
            Self::DoubleList(_) => WidgetValueKind::DoubleList,
            Self::StringList(_) => WidgetValueKind::StringList,
            Self::Json(_) => WidgetValueKind::Json,
            Self::Bytes(_) => WidgetValueKind::Bytes,
        }
    }

    /// The empty default for a value kind.
    ///
    /// Trigger kinds use this as their post-run reset value as well.
    #[must_use]
    pub fn empty(kind: WidgetValueKind) -> Self {
        match kind {
            WidgetValueKind::Bool => Self::Bool(false),
            WidgetValueKind::Int => Self::Int(0),
            WidgetValueKind::Double => Self::Double(0.0),
            WidgetValueKind::String => Self::String(String::new()),
            WidgetValueKind::Trigger => Self::Trigger(false),
            WidgetValueKind::StringTrigger => Self::StringTrigger(None),
            WidgetValueKind::IntList => Self::IntList(Vec::new()),
            WidgetValueKind::DoubleList => Self::DoubleList(Vec::new()),
            WidgetValueKind::StringList => Self::StringList(Vec::new()),
            WidgetValueKind::Json => Self::Json(serde_json::Value::Null),
            WidgetValueKind::Bytes => Self::Bytes(Vec::new()),
        }
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
