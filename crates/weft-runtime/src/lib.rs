//! `weft-runtime` - script-rerun scheduling and session orchestration.
//!
//! The engine behind a weft app: every user interaction re-executes the
//! script top to bottom on a session-owned thread, widget values thread
//! through [`weft_state`] so the rerun looks continuous, and the resulting
//! element deltas stream back to the browser through a coalescing queue
//! and a content-hash dedup cache.
//!
//! A transport embeds this crate by implementing [`SessionClient`],
//! registering connections with [`Runtime::create_session`], and feeding
//! inbound [`weft_proto::BackMsg`] values to [`Runtime::handle_backmsg`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Per-session orchestration.
pub mod app_session;
/// The transport seam.
pub mod client;
/// Configuration schema and loading.
pub mod config;
/// Engine errors.
pub mod error;
mod ids;
/// Media storage with per-session references.
pub mod media;
/// Memoized function-result store.
pub mod memo;
/// Content-hash message cache.
pub mod msg_cache;
/// Ordered, coalescing outbound queue.
pub mod msg_queue;
/// Cooperative script execution.
pub mod runner;
/// Script traits and execution context.
pub mod script;
/// Per-session uploaded file storage.
pub mod uploads;
/// Script source watching.
pub mod watch;

mod runtime;

pub use app_session::AppSession;
pub use client::{ClientDisconnected, SessionClient};
pub use config::{Config, ConfigValue};
pub use error::EngineError;
pub use media::{MediaFile, MediaFileManager};
pub use memo::MemoCache;
pub use msg_cache::ForwardMsgCache;
pub use msg_queue::ForwardMsgQueue;
pub use runner::events::{EventSender, RunnerEvent};
pub use runner::requests::{RequestQueue, RerunData};
pub use runner::{RunnerHandle, RunnerState, ScriptRunner};
pub use runtime::Runtime;
pub use script::{
    CompileError, FragmentStorage, Script, ScriptCtx, ScriptError, ScriptResult, ScriptSource,
};
pub use uploads::{UploadedFileManager, UploadedFileRec};
