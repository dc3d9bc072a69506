//! The transport seam.

use thiserror::Error;
use weft_proto::ForwardMsg;

/// The remote end of a session is gone.
///
/// Never fatal to the engine: the session that observes it marks itself
/// defunct and waits for cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session client disconnected")]
pub struct ClientDisconnected;

/// Where a session's outbound messages go.
///
/// Implemented by the transport layer (a WebSocket writer in a real
/// deployment, a recording stub in tests). Implementations serialize the
/// message however their wire needs; ordering of calls is the engine's
/// delivery order and must be preserved.
pub trait SessionClient: Send + Sync {
    /// Deliver one message to the browser session.
    fn write_forward_msg(&self, msg: &ForwardMsg) -> Result<(), ClientDisconnected>;
}
