//! Display element payloads and deltas.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::value::{WidgetValueKind, WireValue};

/// A single display element.
///
/// The engine itself only mints a handful of element shapes; the full
/// component library lives above this crate and funnels everything it draws
/// through these payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    /// Plain text.
    Text {
        /// Body text.
        body: String,
    },
    /// Markdown-formatted text.
    Markdown {
        /// Markdown source.
        body: String,
    },
    /// An uncaught script error rendered in place of the failed element.
    Exception {
        /// Error type name.
        type_name: SmolStr,
        /// Error message.
        message: String,
        /// Stringified cause chain, outermost first.
        stack: Vec<String>,
    },
    /// A widget-producing element.
    Widget {
        /// Stable widget identity.
        id: SmolStr,
        /// Widget kind name (e.g. `"button"`, `"slider"`).
        kind: SmolStr,
        /// Display label.
        label: String,
        /// Value kind the widget reports.
        value_kind: WidgetValueKind,
        /// Declared default in wire form.
        default: WireValue,
    },
    /// Arbitrary JSON payload element.
    Json {
        /// Payload body.
        body: serde_json::Value,
    },
    /// Placeholder with no content.
    Empty,
}

impl Element {
    /// Short tag for logging.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Markdown { .. } => "markdown",
            Self::Exception { .. } => "exception",
            Self::Widget { .. } => "widget",
            Self::Json { .. } => "json",
            Self::Empty => "empty",
        }
    }
}

/// A positioned UI update: place `element` at `path` in the element tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Position in the element tree. A later delta with the same path
    /// replaces the element at that position.
    pub path: Vec<u32>,
    /// The element to place.
    pub element: Element,
}

impl Delta {
    /// A delta at a top-level position.
    #[must_use]
    pub fn at(index: u32, element: Element) -> Self {
        Self {
            path: vec![index],
            element,
        }
    }
}
