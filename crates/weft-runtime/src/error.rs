//! Engine errors.

use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised by the engine itself, as opposed to script failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Unknown session id.
    #[error("session '{0}' not found")]
    SessionNotFound(SmolStr),

    /// OS thread spawn failure.
    #[error("thread spawn error '{0}'")]
    ThreadSpawn(SmolStr),

    /// Configuration file or option error.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),

    /// Source watcher setup failure.
    #[error("watch error '{0}'")]
    Watch(SmolStr),
}
