//! Thread-safe facade with yield hook.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use weft_proto::WidgetStates;

use crate::error::{Interrupt, StateError};
use crate::session_state::{RegisteredWidget, SessionState};
use crate::value::Value;
use crate::widget::WidgetMetadata;

/// Checked before every script-originated state access; returning an
/// [`Interrupt`] unwinds the run at that point.
pub type YieldHook = Arc<dyn Fn() -> Result<(), Interrupt> + Send + Sync>;

/// Serializes all access to one [`SessionState`] and turns script-side
/// access into interruption yield points.
///
/// The hook belongs to the facade, not the shared state: each script run
/// gets its own [`SafeSessionState::scoped`] view wired to its own request
/// queue, so a superseded run keeps honoring its stop request while its
/// replacement is already executing against the same underlying state.
/// Engine-lifecycle operations bypass the hook: the runner calls them while
/// it is itself driving the run boundary.
#[derive(Clone)]
pub struct SafeSessionState {
    inner: Arc<Mutex<SessionState>>,
    hook: Option<YieldHook>,
}

impl std::fmt::Debug for SafeSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeSessionState")
            .field("scoped", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for SafeSessionState {
    fn default() -> Self {
        Self::new(SessionState::new())
    }
}

impl SafeSessionState {
    /// Wrap a session state for shared use, with no yield hook.
    #[must_use]
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            hook: None,
        }
    }

    /// A view of the same state whose script-facing operations run `hook`
    /// first.
    #[must_use]
    pub fn scoped(&self, hook: YieldHook) -> Self {
        Self {
            inner: self.inner.clone(),
            hook: Some(hook),
        }
    }

    /// A view of the same state with no yield hook.
    #[must_use]
    pub fn unscoped(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            hook: None,
        }
    }

    /// Run the yield hook, if this view carries one.
    pub fn checkpoint(&self) -> Result<(), StateError> {
        if let Some(hook) = &self.hook {
            hook()?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.inner.lock().expect("session state lock poisoned")
    }

    // --- script-facing operations: every one is a yield point ---

    /// Read a value.
    pub fn get(&self, key: &str) -> Result<Value, StateError> {
        self.checkpoint()?;
        self.lock().get(key)
    }

    /// Assign a value.
    pub fn insert(&self, key: impl Into<SmolStr>, value: Value) -> Result<(), StateError> {
        self.checkpoint()?;
        self.lock().insert(key, value)
    }

    /// Remove a key.
    pub fn remove(&self, key: &str) -> Result<(), StateError> {
        self.checkpoint()?;
        self.lock().remove(key)
    }

    /// Whether a value is visible under `key`.
    pub fn contains(&self, key: &str) -> Result<bool, StateError> {
        self.checkpoint()?;
        Ok(self.lock().contains(key))
    }

    /// Register a widget for the current run.
    pub fn register_widget(
        &self,
        metadata: WidgetMetadata,
    ) -> Result<RegisteredWidget, StateError> {
        self.checkpoint()?;
        self.lock().register_widget(metadata)
    }

    /// The discoverable (user-keyed) projection of the state.
    pub fn filtered_state(&self) -> Result<IndexMap<SmolStr, Value>, StateError> {
        self.checkpoint()?;
        Ok(self.lock().filtered_state())
    }

    // --- engine-facing operations: no yield ---

    /// Run-boundary bookkeeping before a run; fires change callbacks with
    /// the state lock held (callbacks receive the state directly and never
    /// re-enter this facade).
    pub fn on_script_will_rerun(&self, frontend: &WidgetStates) {
        self.lock().on_script_will_rerun(frontend);
    }

    /// Run-boundary bookkeeping after a run.
    pub fn on_script_finished(
        &self,
        active_ids: &FxHashSet<SmolStr>,
        executed_fragments: &FxHashSet<SmolStr>,
        fragment_scoped: bool,
    ) {
        self.lock()
            .on_script_finished(active_ids, executed_fragments, fragment_scoped);
    }

    /// Serialize current widget values into a wire snapshot.
    #[must_use]
    pub fn widget_states_snapshot(&self) -> WidgetStates {
        self.lock().widget_states_snapshot()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Direct access for engine code and tests.
    pub fn with<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        f(&mut self.lock())
    }
}
