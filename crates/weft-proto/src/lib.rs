//! `weft-proto` - wire protocol types for the weft app engine.
//!
//! Everything a browser session and the engine exchange is defined here:
//! widget values in their wire form, widget state snapshots, outbound
//! [`ForwardMsg`] updates and inbound [`BackMsg`] interactions. The engine
//! core (`weft-runtime`) produces and consumes these; the transport layer
//! only moves their serialized bytes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Inbound browser-to-engine messages.
pub mod back;
/// Display element payloads and deltas.
pub mod element;
/// Outbound engine-to-browser messages.
pub mod forward;
/// Page metadata.
pub mod page;
/// Wire-level widget values.
pub mod value;
/// Widget state snapshots.
pub mod widget;

pub use back::{BackMsg, ClientState};
pub use element::{Delta, Element};
pub use forward::{FileUrl, ForwardMsg, ScriptFinishedStatus};
pub use page::PageInfo;
pub use value::{WidgetValueKind, WireValue};
pub use widget::{WidgetState, WidgetStates};
