//! Process-wide session registry.

use std::path::Path;
use std::sync::{Arc, Mutex, Weak};

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, info, warn};
use weft_proto::BackMsg;

use crate::app_session::AppSession;
use crate::client::SessionClient;
use crate::config::Config;
use crate::error::EngineError;
use crate::ids::fresh_id;
use crate::media::MediaFileManager;
use crate::memo::MemoCache;
use crate::msg_cache::ForwardMsgCache;
use crate::script::ScriptSource;
use crate::uploads::UploadedFileManager;
use crate::watch::SourceWatcher;

/// Maps session ids to live [`AppSession`]s and owns the resources they
/// share: the message dedup cache, uploaded files, media payloads, the
/// memoization store and the optional source watcher.
pub struct Runtime {
    config: Arc<Config>,
    source: Arc<dyn ScriptSource>,
    sessions: Mutex<IndexMap<SmolStr, Arc<AppSession>>>,
    cache: Arc<ForwardMsgCache>,
    uploads: Arc<UploadedFileManager>,
    media: Arc<MediaFileManager>,
    memo: Arc<MemoCache>,
    watcher: Mutex<Option<SourceWatcher>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Assemble a runtime serving one app source.
    #[must_use]
    pub fn new(config: Config, source: Arc<dyn ScriptSource>) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            source,
            sessions: Mutex::new(IndexMap::new()),
            cache: Arc::new(ForwardMsgCache::new()),
            uploads: Arc::new(UploadedFileManager::new()),
            media: Arc::new(MediaFileManager::new()),
            memo: Arc::new(MemoCache::new()),
            watcher: Mutex::new(None),
        })
    }

    /// The runtime's configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The shared message cache (the transport answers payload fetches
    /// from it).
    #[must_use]
    pub fn message_cache(&self) -> &Arc<ForwardMsgCache> {
        &self.cache
    }

    /// The shared upload store.
    #[must_use]
    pub fn uploaded_files(&self) -> &Arc<UploadedFileManager> {
        &self.uploads
    }

    /// The shared media store (the transport serves media fetches from
    /// it).
    #[must_use]
    pub fn media_files(&self) -> &Arc<MediaFileManager> {
        &self.media
    }

    /// The shared memoization store.
    #[must_use]
    pub fn memo_cache(&self) -> &Arc<MemoCache> {
        &self.memo
    }

    /// Register a new browser session.
    pub fn create_session(&self, client: Arc<dyn SessionClient>) -> SmolStr {
        let id = fresh_id("session");
        let session = AppSession::new(
            id.clone(),
            self.config.clone(),
            self.source.clone(),
            client,
            self.cache.clone(),
            self.uploads.clone(),
            self.media.clone(),
            self.memo.clone(),
        );
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .insert(id.clone(), session);
        info!(session = %id, "session created");
        id
    }

    /// Look up a live session.
    #[must_use]
    pub fn session(&self, id: &str) -> Option<Arc<AppSession>> {
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .len()
    }

    /// Route one inbound message to its session.
    pub fn handle_backmsg(&self, session_id: &str, msg: BackMsg) -> Result<(), EngineError> {
        let session = self
            .session(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(SmolStr::new(session_id)))?;
        session.handle_backmsg(msg);
        Ok(())
    }

    /// Close one session. Idempotent: closing an unknown id is a no-op.
    pub fn close_session(&self, session_id: &str) {
        let session = self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .shift_remove(session_id);
        let Some(session) = session else {
            return;
        };
        session.shutdown();
        debug!(session = session_id, "session closed");
    }

    /// Close sessions whose client vanished.
    pub fn sweep_defunct(&self) {
        let defunct: Vec<SmolStr> = self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .iter()
            .filter(|(_, session)| session.is_defunct())
            .map(|(id, _)| id.clone())
            .collect();
        for id in defunct {
            self.close_session(&id);
        }
    }

    /// Start watching the script source, fanning changes out to every
    /// session. No-op unless `runner.watch_source` is set.
    pub fn watch_source(self: &Arc<Self>, path: impl AsRef<Path>) -> Result<(), EngineError> {
        if !self.config.watch_source() {
            return Ok(());
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let watcher = SourceWatcher::spawn(
            path.as_ref().to_path_buf(),
            Arc::new(move || {
                if let Some(runtime) = weak.upgrade() {
                    runtime.on_source_changed();
                }
            }),
        )?;
        *self.watcher.lock().expect("watcher lock poisoned") = Some(watcher);
        Ok(())
    }

    /// Fan a source change out to every live session.
    pub fn on_source_changed(&self) {
        let sessions: Vec<Arc<AppSession>> = self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .values()
            .cloned()
            .collect();
        for session in sessions {
            session.on_source_changed();
        }
    }

    /// Close every session and stop watching. Idempotent.
    pub fn shutdown(&self) {
        *self.watcher.lock().expect("watcher lock poisoned") = None;
        let ids: Vec<SmolStr> = self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        if !ids.is_empty() {
            info!(sessions = ids.len(), "shutting down runtime");
        }
        for id in ids {
            self.close_session(&id);
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let leftover = self
            .sessions
            .lock()
            .map(|sessions| sessions.len())
            .unwrap_or(0);
        if leftover > 0 {
            warn!(sessions = leftover, "runtime dropped with live sessions");
        }
    }
}
