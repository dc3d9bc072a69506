//! Runner lifecycle events.

use std::sync::Arc;

use smol_str::SmolStr;
use weft_proto::ScriptFinishedStatus;

/// Receives runner events synchronously on the emitting thread.
///
/// Synchronous delivery is what makes message ordering trivial: the
/// session's `NewSession` enqueue happens on the script thread before the
/// first delta can possibly follow it.
pub type EventSender = Arc<dyn Fn(RunnerEvent) + Send + Sync>;

/// Published by a runner at every state transition and message enqueue,
/// in emission order, for the owning session (and for tests).
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    /// A run began; the session turns this into a `NewSession` message.
    ScriptStarted {
        /// Identity of the run.
        run_id: SmolStr,
        /// Page being executed.
        page_id: SmolStr,
        /// Set for fragment-scoped runs.
        fragment_id: Option<SmolStr>,
    },
    /// The script thread placed a message on the forward queue.
    ForwardMsgEnqueued,
    /// A run reached a terminal state.
    ScriptStopped {
        /// Identity of the run that stopped.
        run_id: SmolStr,
        /// How it ended.
        status: ScriptFinishedStatus,
    },
    /// The runner thread is exiting; its request queue accepts nothing.
    Shutdown,
}
