//! Cooperative script execution on a dedicated thread.

/// Runner lifecycle events.
pub mod events;
/// Request coalescing between session and runner.
pub mod requests;

use std::sync::{Arc, Mutex};
use std::thread;

use smol_str::SmolStr;
use tracing::{debug, warn};
use weft_proto::{ForwardMsg, ScriptFinishedStatus};
use weft_state::{Interrupt, SafeSessionState};

use crate::config::Config;
use crate::error::EngineError;
use crate::ids::fresh_id;
use crate::msg_queue::ForwardMsgQueue;
use crate::script::{
    exception_element, CompileError, FragmentStorage, Script, ScriptCtx, ScriptError, ScriptSource,
};
use events::{EventSender, RunnerEvent};
use requests::{RequestQueue, RerunData};

/// Lifecycle of one runner instance.
///
/// A runner loops back into `Running` as long as coalesced rerun requests
/// keep arriving; `Shutdown` is terminal and latches the request queue
/// shut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerState {
    #[default]
    /// Constructed, thread not yet running a script.
    NotStarted,
    /// Executing the script body.
    Running,
    /// Last run was unwound so a queued rerun can start.
    StoppedForRerun,
    /// Last run completed (including stops and displayed script errors).
    StoppedWithSuccess,
    /// Last run never started: the script failed to load.
    StoppedWithCompileError,
    /// The thread has exited.
    Shutdown,
}

/// Executes a session's script runs on one dedicated OS thread.
///
/// The thread polls the request queue only at yield points — element
/// enqueues, session-state access, explicit checkpoints — and unwinds
/// cleanly when a stop or rerun is pending. Between two consecutive runs
/// the session state is bracketed by `on_script_will_rerun` /
/// `on_script_finished`, whatever path the run took.
pub struct ScriptRunner {
    session_id: SmolStr,
    state: SafeSessionState,
    source: Arc<dyn ScriptSource>,
    queue: Arc<ForwardMsgQueue>,
    fragments: Arc<FragmentStorage>,
    config: Arc<Config>,
    requests: Arc<RequestQueue>,
    events: EventSender,
}

impl ScriptRunner {
    /// Assemble a runner for one session.
    #[must_use]
    pub fn new(
        session_id: impl Into<SmolStr>,
        state: SafeSessionState,
        source: Arc<dyn ScriptSource>,
        queue: Arc<ForwardMsgQueue>,
        fragments: Arc<FragmentStorage>,
        config: Arc<Config>,
        events: EventSender,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            state,
            source,
            queue,
            fragments,
            config,
            requests: Arc::new(RequestQueue::new()),
            events,
        }
    }

    /// Spawn the execution thread with an initial rerun.
    pub fn spawn(self, initial: RerunData) -> Result<RunnerHandle, EngineError> {
        let state = Arc::new(Mutex::new(RunnerState::NotStarted));
        let requests = self.requests.clone();
        let state_thread = state.clone();
        let name = format!("weft-runner-{}", self.session_id);
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || self.run_loop(initial, &state_thread))
            .map_err(|err| EngineError::ThreadSpawn(err.to_string().into()))?;
        Ok(RunnerHandle {
            requests,
            state,
            join: Some(join),
        })
    }

    /// Run the whole loop on the current thread; deterministic harness for
    /// tests and single-shot tools.
    pub fn run_to_shutdown(self, initial: RerunData) {
        let state = Arc::new(Mutex::new(RunnerState::NotStarted));
        self.run_loop(initial, &state);
    }

    fn run_loop(self, initial: RerunData, state_slot: &Arc<Mutex<RunnerState>>) {
        let mut data = initial;
        loop {
            set_state(state_slot, RunnerState::Running);
            let status = self.run_once(&data);
            let stopped = match &status {
                ScriptFinishedStatus::Success => RunnerState::StoppedWithSuccess,
                ScriptFinishedStatus::CompileError { .. } => RunnerState::StoppedWithCompileError,
                ScriptFinishedStatus::RerunRequested => RunnerState::StoppedForRerun,
            };
            set_state(state_slot, stopped);
            match self.requests.on_ready() {
                Some(next) => data = next,
                None => break,
            }
        }
        set_state(state_slot, RunnerState::Shutdown);
        (self.events)(RunnerEvent::Shutdown);
        debug!(session = %self.session_id, "script runner shut down");
    }

    fn run_once(&self, data: &RerunData) -> ScriptFinishedStatus {
        let run_id = fresh_id("run");
        let page_id = if data.page_id.is_empty() {
            self.source.main_page().page_id
        } else {
            data.page_id.clone()
        };
        (self.events)(RunnerEvent::ScriptStarted {
            run_id: run_id.clone(),
            page_id: page_id.clone(),
            fragment_id: data.fragment_id.clone(),
        });

        // Load before the run bracket opens: a script that cannot load never
        // entered the run at all.
        let script = match self.load_script(&page_id) {
            Ok(script) => script,
            Err(err) => {
                warn!(session = %self.session_id, page = %page_id, error = %err, "script failed to load");
                let status = ScriptFinishedStatus::CompileError {
                    message: err.to_string(),
                };
                (self.events)(RunnerEvent::ScriptStopped {
                    run_id,
                    status: status.clone(),
                });
                return status;
            }
        };

        let widget_states = data
            .widget_states
            .clone()
            .unwrap_or_else(|| self.state.widget_states_snapshot());

        let scoped = if self.config.yield_on_state_access() {
            let requests = self.requests.clone();
            self.state.scoped(Arc::new(move || match requests.on_yield() {
                Some(interrupt) => Err(interrupt),
                None => Ok(()),
            }))
        } else {
            self.state.unscoped()
        };

        scoped.on_script_will_rerun(&widget_states);
        if data.fragment_id.is_none() {
            self.fragments.clear();
        }

        let mut ctx = ScriptCtx::new(
            scoped.clone(),
            &self.queue,
            &self.events,
            &self.requests,
            &self.fragments,
            data.query_string.clone(),
            page_id.clone(),
        );
        let result = self.execute(&script, &mut ctx, data.fragment_id.as_deref());

        let (status, completed) = match result {
            Ok(()) => (ScriptFinishedStatus::Success, true),
            // A stop is a clean outcome, not an error.
            Err(ScriptError::Interrupted(Interrupt::Stop)) => {
                (ScriptFinishedStatus::Success, false)
            }
            Err(ScriptError::Interrupted(Interrupt::Rerun)) => {
                (ScriptFinishedStatus::RerunRequested, false)
            }
            Err(err) => {
                // Display concern: render the failure where the next element
                // would have gone; the run still counts as a success.
                ctx.enqueue_unchecked(exception_element(&err));
                (ScriptFinishedStatus::Success, false)
            }
        };

        // Only a run that made it to the end owns the run boundary. A
        // partial run's widget set is no evidence of removal, and under
        // fast reruns a superseded runner may unwind while its replacement
        // is already executing; it must not touch shared state on the way
        // out. The next run's on_script_will_rerun resets triggers anyway.
        if completed {
            scoped.on_script_finished(
                ctx.active_ids(),
                ctx.executed_fragments(),
                data.fragment_id.is_some(),
            );
        }

        (self.events)(RunnerEvent::ScriptStopped {
            run_id,
            status: status.clone(),
        });
        status
    }

    fn execute(
        &self,
        script: &Arc<dyn Script>,
        ctx: &mut ScriptCtx<'_>,
        fragment_id: Option<&str>,
    ) -> Result<(), ScriptError> {
        if let Some(fragment_id) = fragment_id {
            if let Some(body) = self.fragments.get(fragment_id) {
                return ctx.run_fragment_body(fragment_id, &body);
            }
            warn!(
                session = %self.session_id,
                fragment = fragment_id,
                "unknown fragment, falling back to a full run"
            );
        }
        script.run(ctx)
    }

    fn load_script(&self, page_id: &str) -> Result<Arc<dyn Script>, CompileError> {
        match self.source.load(page_id) {
            Ok(script) => Ok(script),
            Err(CompileError::PageNotFound(missing)) => {
                self.queue
                    .enqueue(ForwardMsg::PageNotFound { page_id: missing });
                (self.events)(RunnerEvent::ForwardMsgEnqueued);
                self.source.load(&self.source.main_page().page_id)
            }
            Err(err) => Err(err),
        }
    }
}

/// Owner-side view of a spawned runner: steer it, watch it, join it.
#[derive(Debug)]
pub struct RunnerHandle {
    requests: Arc<RequestQueue>,
    state: Arc<Mutex<RunnerState>>,
    join: Option<thread::JoinHandle<()>>,
}

impl RunnerHandle {
    /// Hand the runner a coalesced rerun request. False means the runner is
    /// draining toward shutdown and cannot take it.
    pub fn request_rerun(&self, data: RerunData) -> bool {
        self.requests.request_rerun(data)
    }

    /// Ask the runner to stop at its next yield point.
    pub fn request_stop(&self) {
        self.requests.request_stop();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        *self.state.lock().expect("runner state lock poisoned")
    }

    /// Join the execution thread.
    pub fn join(&mut self) -> thread::Result<()> {
        if let Some(join) = self.join.take() {
            return join.join();
        }
        Ok(())
    }
}

fn set_state(slot: &Arc<Mutex<RunnerState>>, state: RunnerState) {
    *slot.lock().expect("runner state lock poisoned") = state;
}
