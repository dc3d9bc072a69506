//! In-memory media storage with per-session reference tracking.

use std::sync::Mutex;

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

/// One media payload (image, audio, arbitrary bytes) served to browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Content identity; equal content gets equal ids.
    pub media_id: SmolStr,
    /// MIME type reported to the browser.
    pub mime_type: SmolStr,
    /// Payload bytes.
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct MediaEntry {
    file: MediaFile,
    sessions: FxHashSet<SmolStr>,
}

/// Deduplicated media files shared across a runtime's sessions.
///
/// Scripts re-register the same images on every rerun; content addressing
/// keeps one copy, and per-session reference sets let a closing session
/// release exactly what only it was using.
#[derive(Debug, Default)]
pub struct MediaFileManager {
    entries: Mutex<FxHashMap<SmolStr, MediaEntry>>,
}

impl MediaFileManager {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register media for a session, returning its content id.
    pub fn add(
        &self,
        session_id: &str,
        mime_type: impl Into<SmolStr>,
        bytes: Vec<u8>,
    ) -> SmolStr {
        let media_id = content_id(&bytes);
        let mut entries = self.lock();
        let entry = entries.entry(media_id.clone()).or_insert_with(|| MediaEntry {
            file: MediaFile {
                media_id: media_id.clone(),
                mime_type: mime_type.into(),
                bytes,
            },
            sessions: FxHashSet::default(),
        });
        entry.sessions.insert(SmolStr::new(session_id));
        media_id
    }

    /// Fetch a media file by id.
    #[must_use]
    pub fn get(&self, media_id: &str) -> Option<MediaFile> {
        self.lock().get(media_id).map(|entry| entry.file.clone())
    }

    /// Release a session's references, dropping media nobody uses anymore.
    pub fn remove_session_refs(&self, session_id: &str) {
        let mut entries = self.lock();
        for entry in entries.values_mut() {
            entry.sessions.remove(session_id);
        }
        entries.retain(|_, entry| !entry.sessions.is_empty());
    }

    /// Number of stored payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<SmolStr, MediaEntry>> {
        self.entries.lock().expect("media store lock poisoned")
    }
}

fn content_id(bytes: &[u8]) -> SmolStr {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for byte in &digest[..16] {
        hex.push_str(&format!("{byte:02x}"));
    }
    SmolStr::new(format!("media-{hex}"))
}
