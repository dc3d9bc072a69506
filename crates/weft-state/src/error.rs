//! State errors and interruption markers.

use smol_str::SmolStr;
use thiserror::Error;

/// A pending interruption observed at a yield point.
///
/// Carries no payload: the coalesced rerun data stays in the runner's
/// request queue and is consumed there, so the unwind path and the
/// coalescing rules cannot disagree about which data applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Unwind the run; do not start another.
    Stop,
    /// Unwind the run; the runner restarts with the queued rerun data.
    Rerun,
}

/// Errors surfaced by session-state operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Reading a key nothing ever wrote. Expected and recoverable.
    #[error("key '{0}' not found in session state (did you forget to initialize it?)")]
    KeyNotFound(SmolStr),

    /// A widget value was requested for an id with no registered metadata.
    #[error("no widget metadata registered for id '{0}'")]
    MissingMetadata(SmolStr),

    /// Two widgets produced the same id in one run.
    #[error(
        "there are multiple '{kind}' widgets with the same generated id; \
         add a distinct key=... to each '{kind}' to tell them apart"
    )]
    DuplicateWidgetId {
        /// Widget kind, e.g. `"button"`.
        kind: SmolStr,
        /// The colliding id.
        id: SmolStr,
    },

    /// A keyed widget already committed its value for this run.
    #[error("cannot assign to key '{0}': its widget was already instantiated in this run")]
    WidgetValueCommitted(SmolStr),

    /// The run was asked to unwind at a yield point.
    #[error("script run interrupted")]
    Interrupted(Interrupt),
}

impl From<Interrupt> for StateError {
    fn from(value: Interrupt) -> Self {
        Self::Interrupted(value)
    }
}
