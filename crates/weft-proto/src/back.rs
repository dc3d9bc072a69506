//! Inbound browser-to-engine messages.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::widget::WidgetStates;

/// Frontend state accompanying a rerun request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    /// Raw query string of the browser URL.
    #[serde(default)]
    pub query_string: SmolStr,
    /// Page the rerun targets; empty means the main page.
    #[serde(default)]
    pub page_id: SmolStr,
    /// Widget values as the frontend last saw them.
    #[serde(default)]
    pub widget_states: WidgetStates,
    /// When set, the rerun is scoped to this fragment.
    #[serde(default)]
    pub fragment_id: Option<SmolStr>,
}

/// A message from the browser session to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackMsg {
    /// Run the script (again) with the given frontend state.
    Rerun {
        /// Frontend state snapshot.
        client_state: ClientState,
    },
    /// Stop the in-progress run without starting another.
    StopScript,
    /// Drop memoized function results and per-session caches.
    ClearCache,
    /// Connection liveness probe.
    Heartbeat,
    /// Toggle rerun-on-source-change for this session.
    SetRunOnSave {
        /// New setting.
        value: bool,
    },
    /// Resolve upload URLs for the named files.
    FileUrlsRequest {
        /// Correlates the response to this request.
        request_id: SmolStr,
        /// File names the frontend wants to upload.
        file_names: Vec<String>,
    },
    /// Request one chunk of a large payload.
    FetchChunk {
        /// Chunk identity.
        id: SmolStr,
    },
}

impl BackMsg {
    /// Short tag for logging.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Rerun { .. } => "rerun",
            Self::StopScript => "stop_script",
            Self::ClearCache => "clear_cache",
            Self::Heartbeat => "heartbeat",
            Self::SetRunOnSave { .. } => "set_run_on_save",
            Self::FileUrlsRequest { .. } => "file_urls_request",
            Self::FetchChunk { .. } => "fetch_chunk",
        }
    }
}
