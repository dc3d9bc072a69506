//! Per-session orchestration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use smol_str::SmolStr;
use tracing::{debug, warn};
use weft_proto::{BackMsg, ClientState, ForwardMsg};
use weft_state::SafeSessionState;

use crate::client::SessionClient;
use crate::config::Config;
use crate::error::EngineError;
use crate::media::MediaFileManager;
use crate::memo::MemoCache;
use crate::msg_cache::ForwardMsgCache;
use crate::msg_queue::ForwardMsgQueue;
use crate::runner::events::RunnerEvent;
use crate::runner::requests::RerunData;
use crate::runner::{RunnerHandle, RunnerState, ScriptRunner};
use crate::script::{FragmentStorage, ScriptSource};
use crate::uploads::UploadedFileManager;

/// Owns the session state and the (at most one live) script runner for one
/// browser connection.
///
/// Decides how an incoming rerun request meets the current runner — hand it
/// to the runner's coalescing queue, or hard-stop and restart when fast
/// reruns are on — translates runner events into outbound messages, and
/// flushes the forward queue through the dedup cache to the client. Runner
/// events arrive synchronously on the runner thread, so lifecycle messages
/// and element deltas interleave exactly in emission order.
pub struct AppSession {
    id: SmolStr,
    weak_self: Weak<AppSession>,
    config: Arc<Config>,
    state: SafeSessionState,
    source: Arc<dyn ScriptSource>,
    client: Arc<dyn SessionClient>,
    queue: Arc<ForwardMsgQueue>,
    cache: Arc<ForwardMsgCache>,
    fragments: Arc<FragmentStorage>,
    uploads: Arc<UploadedFileManager>,
    media: Arc<MediaFileManager>,
    memo: Arc<MemoCache>,
    runner: Mutex<Option<RunnerHandle>>,
    current_run: Mutex<SmolStr>,
    run_count: AtomicU64,
    run_on_save: AtomicBool,
    script_running: AtomicBool,
    defunct: AtomicBool,
    shut: AtomicBool,
}

impl std::fmt::Debug for AppSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSession")
            .field("id", &self.id)
            .field("defunct", &self.defunct.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl AppSession {
    /// Assemble a session around a connected client.
    #[must_use]
    pub fn new(
        id: impl Into<SmolStr>,
        config: Arc<Config>,
        source: Arc<dyn ScriptSource>,
        client: Arc<dyn SessionClient>,
        cache: Arc<ForwardMsgCache>,
        uploads: Arc<UploadedFileManager>,
        media: Arc<MediaFileManager>,
        memo: Arc<MemoCache>,
    ) -> Arc<Self> {
        let run_on_save = config.run_on_save();
        Arc::new_cyclic(|weak_self| Self {
            id: id.into(),
            weak_self: weak_self.clone(),
            config,
            state: SafeSessionState::default(),
            source,
            client,
            queue: Arc::new(ForwardMsgQueue::new()),
            cache,
            fragments: Arc::new(FragmentStorage::new()),
            uploads,
            media,
            memo,
            runner: Mutex::new(None),
            current_run: Mutex::new(SmolStr::default()),
            run_count: AtomicU64::new(0),
            run_on_save: AtomicBool::new(run_on_save),
            script_running: AtomicBool::new(false),
            defunct: AtomicBool::new(false),
            shut: AtomicBool::new(false),
        })
    }

    /// Session identity.
    #[must_use]
    pub fn id(&self) -> &SmolStr {
        &self.id
    }

    /// The session's state handle (engine view, no yield hook).
    #[must_use]
    pub fn session_state(&self) -> &SafeSessionState {
        &self.state
    }

    /// Whether the client vanished or the session was shut down.
    #[must_use]
    pub fn is_defunct(&self) -> bool {
        self.defunct.load(Ordering::SeqCst)
    }

    /// Lifecycle state of the current runner, if one is held.
    #[must_use]
    pub fn runner_state(&self) -> Option<RunnerState> {
        self.runner
            .lock()
            .expect("runner slot lock poisoned")
            .as_ref()
            .map(RunnerHandle::state)
    }

    /// Started-run count; drives cache aging.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::SeqCst)
    }

    /// React to a rerun request from the frontend (or from the engine,
    /// with no client state).
    pub fn request_rerun(&self, client_state: Option<&ClientState>) {
        let data = match client_state {
            Some(state) => RerunData::from_client_state(state),
            None => RerunData {
                widget_states: None,
                query_string: SmolStr::default(),
                page_id: self.source.main_page().page_id,
                fragment_id: None,
            },
        };

        let mut runner = self.runner.lock().expect("runner slot lock poisoned");
        if let Some(handle) = runner.as_ref() {
            let fragment_scoped = data.fragment_id.is_some();
            if !fragment_scoped && self.config.fast_reruns() {
                // Trade a full restart for latency: do not wait for the
                // runner to coalesce the rerun itself. Fragment requests
                // never take this path; they go to the live runner's queue.
                debug!(session = %self.id, "fast rerun: stopping active runner");
                handle.request_stop();
                *runner = None;
            } else if handle.request_rerun(data.clone()) {
                return;
            } else {
                // Runner is draining toward shutdown and accepts nothing.
                *runner = None;
            }
        }

        match self.spawn_runner(data) {
            Ok(handle) => *runner = Some(handle),
            Err(err) => {
                warn!(session = %self.id, error = %err, "failed to spawn script runner");
            }
        }
    }

    fn spawn_runner(&self, data: RerunData) -> Result<RunnerHandle, EngineError> {
        let weak = self.weak_self.clone();
        ScriptRunner::new(
            self.id.clone(),
            self.state.clone(),
            self.source.clone(),
            self.queue.clone(),
            self.fragments.clone(),
            self.config.clone(),
            Arc::new(move |event| {
                if let Some(session) = weak.upgrade() {
                    session.handle_event(event);
                }
            }),
        )
        .spawn(data)
    }

    /// Dispatch one inbound protocol message.
    pub fn handle_backmsg(&self, msg: BackMsg) {
        debug!(session = %self.id, msg = msg.tag(), "handling backmsg");
        match msg {
            BackMsg::Rerun { client_state } => self.request_rerun(Some(&client_state)),
            BackMsg::StopScript => {
                if let Some(handle) = self
                    .runner
                    .lock()
                    .expect("runner slot lock poisoned")
                    .as_ref()
                {
                    handle.request_stop();
                }
            }
            BackMsg::ClearCache => self.memo.clear(),
            BackMsg::Heartbeat => {}
            BackMsg::SetRunOnSave { value } => {
                self.run_on_save.store(value, Ordering::SeqCst);
                self.enqueue_status();
                self.flush();
            }
            BackMsg::FileUrlsRequest {
                request_id,
                file_names,
            } => {
                let file_urls = self.uploads.file_urls(&self.id, &file_names);
                self.queue.enqueue(ForwardMsg::FileUrlsResponse {
                    response_id: request_id,
                    file_urls,
                });
                self.flush();
            }
            BackMsg::FetchChunk { id } => {
                warn!(session = %self.id, chunk = %id, "unsupported message variant ignored");
            }
        }
    }

    /// Translate one runner event into outbound messages. Runs on the
    /// emitting runner's thread.
    pub fn handle_event(&self, event: RunnerEvent) {
        match event {
            RunnerEvent::ScriptStarted {
                run_id,
                page_id,
                fragment_id,
            } => {
                self.run_count.fetch_add(1, Ordering::SeqCst);
                *self.current_run.lock().expect("current run lock poisoned") = run_id.clone();
                self.script_running.store(true, Ordering::SeqCst);
                if fragment_id.is_none() {
                    self.queue.enqueue(ForwardMsg::NewSession {
                        session_id: self.id.clone(),
                        run_id,
                        page_id,
                        pages: self.source.pages(),
                    });
                }
                self.enqueue_status();
                self.flush();
            }
            RunnerEvent::ForwardMsgEnqueued => self.flush(),
            RunnerEvent::ScriptStopped { run_id, status } => {
                let current = self
                    .current_run
                    .lock()
                    .expect("current run lock poisoned")
                    .clone();
                if current != run_id {
                    // A superseded runner reporting after its replacement
                    // already started.
                    debug!(session = %self.id, %run_id, "dropping stale stop event");
                    return;
                }
                self.script_running.store(false, Ordering::SeqCst);
                self.queue.enqueue(ForwardMsg::ScriptFinished(status));
                self.enqueue_status();
                self.flush();
                self.cache.remove_expired(
                    &self.id,
                    self.run_count.load(Ordering::SeqCst),
                    self.config.max_cached_message_age(),
                );
            }
            RunnerEvent::Shutdown => {
                let mut runner = self.runner.lock().expect("runner slot lock poisoned");
                if runner
                    .as_ref()
                    .is_some_and(|handle| handle.state() == RunnerState::Shutdown)
                {
                    *runner = None;
                }
            }
        }
    }

    /// Drain the forward queue to the client, deduplicating large repeats.
    ///
    /// A client write failure marks the session defunct; it is never
    /// escalated.
    pub fn flush(&self) {
        if self.is_defunct() {
            return;
        }
        let run_count = self.run_count.load(Ordering::SeqCst);
        let threshold = self.config.cached_message_size_threshold();
        for msg in self.queue.flush() {
            let prepared = self.cache.prepare(&msg, &self.id, run_count, threshold);
            if self.client.write_forward_msg(&prepared).is_err() {
                warn!(session = %self.id, "session client disconnected, marking session defunct");
                self.defunct.store(true, Ordering::SeqCst);
                break;
            }
        }
    }

    /// The watched script source changed on disk.
    pub fn on_source_changed(&self) {
        if self.run_on_save.load(Ordering::SeqCst) {
            self.request_rerun(None);
        } else {
            self.queue.enqueue(ForwardMsg::PagesChanged {
                pages: self.source.pages(),
            });
            self.flush();
        }
    }

    /// Stop the runner and release per-session resources. Idempotent.
    pub fn shutdown(&self) {
        if self.shut.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(session = %self.id, "shutting down session");
        if let Some(handle) = self
            .runner
            .lock()
            .expect("runner slot lock poisoned")
            .take()
        {
            handle.request_stop();
        }
        self.uploads.remove_session_files(&self.id);
        self.media.remove_session_refs(&self.id);
        self.cache.remove_session(&self.id);
        self.flush();
        self.defunct.store(true, Ordering::SeqCst);
    }

    fn enqueue_status(&self) {
        self.queue.enqueue(ForwardMsg::SessionStatusChanged {
            run_on_save: self.run_on_save.load(Ordering::SeqCst),
            script_is_running: self.script_running.load(Ordering::SeqCst),
        });
    }
}
