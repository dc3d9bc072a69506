//! `weft-state` - session state and widget reconciliation.
//!
//! One [`SessionState`] lives for the whole lifetime of a browser session
//! and threads widget values through otherwise-stateless script runs: values
//! the frontend sent, values the current run's widget declarations want, and
//! values left over from previous runs are reconciled behind one dict-like
//! surface. [`SafeSessionState`] wraps it for cross-thread use and doubles
//! as the script's interruption checkpoint.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// State errors and interruption markers.
pub mod error;
/// Widget identity computation.
pub mod id;
/// The reconciling session-state store.
pub mod session_state;
/// Thread-safe facade with yield hook.
pub mod safe;
/// Application-level values.
pub mod value;
/// Widget metadata and value codecs.
pub mod widget;
/// Dual-representation widget state store.
pub mod wstates;

pub use error::{Interrupt, StateError};
pub use id::{compute_widget_id, WIDGET_ID_PREFIX};
pub use safe::{SafeSessionState, YieldHook};
pub use session_state::{RegisteredWidget, SessionState};
pub use value::Value;
pub use widget::{Deserializer, Serializer, WidgetCallback, WidgetMetadata};
pub use wstates::WStates;
