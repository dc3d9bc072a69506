//! Outbound engine-to-browser messages.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

use crate::element::Delta;
use crate::page::PageInfo;

/// Terminal status of a script run, as reported to the frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptFinishedStatus {
    /// The run completed (including stop requests and displayed script
    /// errors; those are display concerns, not engine failures).
    Success,
    /// The script could not be loaded at all.
    CompileError {
        /// Loader error text.
        message: String,
    },
    /// The run was interrupted to start a fresh one.
    RerunRequested,
}

/// Where the frontend should put (and later delete) one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUrl {
    /// Engine-assigned file identity.
    pub file_id: SmolStr,
    /// Upload target.
    pub upload_url: String,
    /// Deletion target.
    pub delete_url: String,
}

/// A UI-update message destined for one browser session.
///
/// Ordering between messages for the same session is part of the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForwardMsg {
    /// A fresh script run has begun.
    NewSession {
        /// Session identity.
        session_id: SmolStr,
        /// Identity of this run; changes on every run.
        run_id: SmolStr,
        /// Page being executed.
        page_id: SmolStr,
        /// All pages of the app.
        pages: Vec<PageInfo>,
    },
    /// Place an element.
    Delta(Delta),
    /// The run reached a terminal state.
    ScriptFinished(ScriptFinishedStatus),
    /// Session-level status flags changed.
    SessionStatusChanged {
        /// Whether source changes trigger automatic reruns.
        run_on_save: bool,
        /// Whether a run is currently executing.
        script_is_running: bool,
    },
    /// The app's page list changed.
    PagesChanged {
        /// New page list.
        pages: Vec<PageInfo>,
    },
    /// A rerun addressed a page that does not exist.
    PageNotFound {
        /// The unknown page id.
        page_id: SmolStr,
    },
    /// Answer to a `FileUrlsRequest`.
    FileUrlsResponse {
        /// The request this answers.
        response_id: SmolStr,
        /// One entry per requested file, in request order.
        file_urls: Vec<FileUrl>,
    },
    /// Stand-in for a previously delivered identical message.
    Ref {
        /// Content hash of the replaced message.
        hash: SmolStr,
    },
}

impl ForwardMsg {
    /// Hex SHA-256 of the canonical JSON encoding.
    ///
    /// Identical payloads hash identically, which is what lets a transport
    /// cache replace repeats with [`ForwardMsg::Ref`].
    #[must_use]
    pub fn hash(&self) -> SmolStr {
        let encoded = self.encoded();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out.into()
    }

    /// Canonical JSON encoding used for hashing and size accounting.
    #[must_use]
    pub fn encoded(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("forward message serialization")
    }

    /// Whether a cache may replace this message with a [`ForwardMsg::Ref`].
    ///
    /// Only element payloads qualify; lifecycle and status messages carry
    /// per-run identifiers and must always travel whole.
    #[must_use]
    pub fn cacheable(&self) -> bool {
        matches!(self, Self::Delta(_))
    }

    /// Short tag for logging.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NewSession { .. } => "new_session",
            Self::Delta(_) => "delta",
            Self::ScriptFinished(_) => "script_finished",
            Self::SessionStatusChanged { .. } => "session_status_changed",
            Self::PagesChanged { .. } => "pages_changed",
            Self::PageNotFound { .. } => "page_not_found",
            Self::FileUrlsResponse { .. } => "file_urls_response",
            Self::Ref { .. } => "ref",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    fn text_delta(index: u32, body: &str) -> ForwardMsg {
        ForwardMsg::Delta(Delta::at(
            index,
            Element::Text {
                body: body.to_string(),
            },
        ))
    }

    #[test]
    fn identical_payloads_hash_identically() {
        assert_eq!(text_delta(0, "hello").hash(), text_delta(0, "hello").hash());
        assert_ne!(text_delta(0, "hello").hash(), text_delta(0, "other").hash());
        assert_ne!(text_delta(0, "hello").hash(), text_delta(1, "hello").hash());
    }

    #[test]
    fn only_deltas_are_cacheable() {
        assert!(text_delta(0, "x").cacheable());
        assert!(!ForwardMsg::ScriptFinished(ScriptFinishedStatus::Success).cacheable());
        assert!(!ForwardMsg::PageNotFound { page_id: "p".into() }.cacheable());
    }
}
