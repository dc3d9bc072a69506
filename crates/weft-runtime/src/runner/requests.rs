//! The coalescing request queue between a runner and its session.

use std::sync::Mutex;

use smol_str::SmolStr;
use weft_proto::{ClientState, WidgetStates};
use weft_state::Interrupt;

/// Everything a rerun starts from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RerunData {
    /// Widget snapshot to seed the run; `None` means "whatever the session
    /// currently holds".
    pub widget_states: Option<WidgetStates>,
    /// Query string of the requesting page.
    pub query_string: SmolStr,
    /// Page to execute; empty means the main page.
    pub page_id: SmolStr,
    /// When set, rerun only this fragment.
    pub fragment_id: Option<SmolStr>,
}

impl RerunData {
    /// Build from a frontend snapshot.
    #[must_use]
    pub fn from_client_state(state: &ClientState) -> Self {
        Self {
            widget_states: Some(state.widget_states.clone()),
            query_string: state.query_string.clone(),
            page_id: state.page_id.clone(),
            fragment_id: state.fragment_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RequestState {
    /// Nothing pending; keep running.
    Continue,
    /// A rerun is pending with this data.
    Rerun(RerunData),
    /// Stop; the runner is draining toward shutdown and accepts nothing.
    Stop,
}

/// The single cross-thread slot through which a runner is steered.
///
/// Requests coalesce: a later rerun replaces a pending one (a full-run
/// request absorbs a pending fragment-scoped one, never the reverse), and
/// stop beats everything. The execution thread polls [`on_yield`] at yield
/// points without consuming pending rerun data; only [`on_ready`] at the
/// loop top consumes it, so exactly the most recent data starts the next
/// run.
///
/// [`on_yield`]: RequestQueue::on_yield
/// [`on_ready`]: RequestQueue::on_ready
#[derive(Debug)]
pub struct RequestQueue {
    state: Mutex<RequestState>,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    /// Queue in the `Continue` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RequestState::Continue),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RequestState> {
        self.state.lock().expect("request queue lock poisoned")
    }

    /// Ask for a rerun. Returns false when the runner is already draining
    /// toward shutdown and a fresh runner is needed instead.
    pub fn request_rerun(&self, data: RerunData) -> bool {
        let mut state = self.lock();
        match &*state {
            RequestState::Stop => false,
            RequestState::Continue => {
                *state = RequestState::Rerun(data);
                true
            }
            RequestState::Rerun(pending) => {
                let keep_pending = pending.fragment_id.is_none() && data.fragment_id.is_some();
                if !keep_pending {
                    *state = RequestState::Rerun(data);
                }
                true
            }
        }
    }

    /// Ask the runner to stop outright, discarding any pending rerun.
    pub fn request_stop(&self) {
        *self.lock() = RequestState::Stop;
    }

    /// Non-blocking poll at a yield point. Pending rerun data is left in
    /// place for [`RequestQueue::on_ready`].
    #[must_use]
    pub fn on_yield(&self) -> Option<Interrupt> {
        match &*self.lock() {
            RequestState::Continue => None,
            RequestState::Rerun(_) => Some(Interrupt::Rerun),
            RequestState::Stop => Some(Interrupt::Stop),
        }
    }

    /// Consume the pending request at the top of the runner loop.
    ///
    /// `None` means shut down; in that case the queue latches into `Stop`
    /// so late rerun requests are rejected and routed to a fresh runner
    /// instead of being silently parked.
    #[must_use]
    pub fn on_ready(&self) -> Option<RerunData> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, RequestState::Continue) {
            RequestState::Rerun(data) => Some(data),
            RequestState::Continue | RequestState::Stop => {
                *state = RequestState::Stop;
                None
            }
        }
    }

    /// Whether the queue has latched into `Stop`.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(&*self.lock(), RequestState::Stop)
    }
}
