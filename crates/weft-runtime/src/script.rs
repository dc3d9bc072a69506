//! The script seams: what user code implements and what it executes
//! against.

use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::json;
use smol_str::SmolStr;
use thiserror::Error;
use weft_proto::{Delta, Element, ForwardMsg, PageInfo, WidgetValueKind};
use weft_state::{
    compute_widget_id, Interrupt, SafeSessionState, StateError, Value, WidgetCallback,
    WidgetMetadata,
};

use crate::msg_queue::ForwardMsgQueue;
use crate::runner::events::{EventSender, RunnerEvent};
use crate::runner::requests::RequestQueue;

/// Why a script run could not even start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The requested page does not exist.
    #[error("page '{0}' not found")]
    PageNotFound(SmolStr),
    /// The source failed to load or build.
    #[error("{0}")]
    Failed(String),
}

/// How a script statement can fail.
///
/// `Interrupted` is the engine's control-flow signal, not an error: it must
/// be propagated with `?`, never matched away. Every `From` conversion
/// preserves it, and the runner re-consults its request queue after the run
/// regardless, so a swallowed signal degrades to "handled at run end"
/// rather than a lost request.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// A stop or rerun request was observed at a yield point.
    #[error("script run interrupted")]
    Interrupted(Interrupt),
    /// A session-state operation failed.
    #[error(transparent)]
    State(StateError),
    /// Anything else user code raised; rendered inline, never fatal.
    #[error("{0}")]
    User(anyhow::Error),
}

impl From<anyhow::Error> for ScriptError {
    fn from(err: anyhow::Error) -> Self {
        Self::User(err)
    }
}

impl From<StateError> for ScriptError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Interrupted(interrupt) => Self::Interrupted(interrupt),
            other => Self::State(other),
        }
    }
}

impl From<Interrupt> for ScriptError {
    fn from(interrupt: Interrupt) -> Self {
        Self::Interrupted(interrupt)
    }
}

/// Result type for script code.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// A user script: one top-to-bottom pass over the app body.
pub trait Script: Send + Sync {
    /// Execute the body against the given context.
    fn run(&self, ctx: &mut ScriptCtx<'_>) -> ScriptResult<()>;
}

impl<F> Script for F
where
    F: Fn(&mut ScriptCtx<'_>) -> ScriptResult<()> + Send + Sync,
{
    fn run(&self, ctx: &mut ScriptCtx<'_>) -> ScriptResult<()> {
        self(ctx)
    }
}

/// Loads pages into runnable scripts. Loading happens at the top of every
/// run, so a changed source is picked up by the next rerun.
pub trait ScriptSource: Send + Sync {
    /// Build the script for a page.
    fn load(&self, page_id: &str) -> Result<Arc<dyn Script>, CompileError>;
    /// All pages of the app.
    fn pages(&self) -> Vec<PageInfo>;
    /// The page a rerun with no page id targets.
    fn main_page(&self) -> PageInfo;
}

/// A fragment body, stored so a fragment-scoped rerun can execute it
/// without replaying the whole script.
pub type FragmentFn = Arc<dyn Fn(&mut ScriptCtx<'_>) -> ScriptResult<()> + Send + Sync>;

/// Fragment bodies registered by the most recent full run.
#[derive(Default)]
pub struct FragmentStorage {
    fragments: Mutex<FxHashMap<SmolStr, FragmentFn>>,
}

impl std::fmt::Debug for FragmentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fragments = self.fragments.lock().expect("fragment storage poisoned");
        f.debug_struct("FragmentStorage")
            .field("len", &fragments.len())
            .finish()
    }
}

impl FragmentStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a fragment body.
    pub fn insert(&self, id: impl Into<SmolStr>, body: FragmentFn) {
        self.fragments
            .lock()
            .expect("fragment storage poisoned")
            .insert(id.into(), body);
    }

    /// Look up a fragment body.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<FragmentFn> {
        self.fragments
            .lock()
            .expect("fragment storage poisoned")
            .get(id)
            .cloned()
    }

    /// Drop everything; a fresh full run re-registers what still exists.
    pub fn clear(&self) {
        self.fragments
            .lock()
            .expect("fragment storage poisoned")
            .clear();
    }
}

/// Everything a script statement needs, passed explicitly.
///
/// Element enqueues and session-state access are the run's yield points;
/// both check the runner's request queue before touching anything shared.
pub struct ScriptCtx<'a> {
    state: SafeSessionState,
    queue: &'a ForwardMsgQueue,
    events: &'a EventSender,
    requests: &'a RequestQueue,
    fragments: &'a FragmentStorage,
    query_string: SmolStr,
    page_id: SmolStr,
    cursor: u32,
    active_ids: FxHashSet<SmolStr>,
    executed_fragments: FxHashSet<SmolStr>,
    fragment_stack: Vec<SmolStr>,
}

impl<'a> ScriptCtx<'a> {
    pub(crate) fn new(
        state: SafeSessionState,
        queue: &'a ForwardMsgQueue,
        events: &'a EventSender,
        requests: &'a RequestQueue,
        fragments: &'a FragmentStorage,
        query_string: SmolStr,
        page_id: SmolStr,
    ) -> Self {
        Self {
            state,
            queue,
            events,
            requests,
            fragments,
            query_string,
            page_id,
            cursor: 0,
            active_ids: FxHashSet::default(),
            executed_fragments: FxHashSet::default(),
            fragment_stack: Vec::new(),
        }
    }

    /// The session state, as a yield-point-aware facade.
    #[must_use]
    pub fn state(&self) -> &SafeSessionState {
        &self.state
    }

    /// Query string of the request that started this run.
    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Page this run is executing.
    #[must_use]
    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Explicit yield point for compute-heavy stretches with no UI calls.
    pub fn checkpoint(&self) -> ScriptResult<()> {
        if let Some(interrupt) = self.requests.on_yield() {
            return Err(ScriptError::Interrupted(interrupt));
        }
        Ok(())
    }

    /// Read a session value.
    pub fn get(&self, key: &str) -> ScriptResult<Value> {
        Ok(self.state.get(key)?)
    }

    /// Write a session value.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> ScriptResult<()> {
        Ok(self.state.insert(key, value.into())?)
    }

    /// Place an element at the next position. A yield point.
    pub fn enqueue(&mut self, element: Element) -> ScriptResult<()> {
        self.checkpoint()?;
        self.enqueue_unchecked(element);
        Ok(())
    }

    /// Place an element without yielding; engine-internal (the runner uses
    /// this to render the exception block of a failed run).
    pub(crate) fn enqueue_unchecked(&mut self, element: Element) {
        let index = self.cursor;
        self.cursor += 1;
        self.queue.enqueue(ForwardMsg::Delta(Delta::at(index, element)));
        (self.events)(RunnerEvent::ForwardMsgEnqueued);
    }

    /// Plain text element.
    pub fn text(&mut self, body: impl Into<String>) -> ScriptResult<()> {
        self.enqueue(Element::Text { body: body.into() })
    }

    /// Markdown element.
    pub fn markdown(&mut self, body: impl Into<String>) -> ScriptResult<()> {
        self.enqueue(Element::Markdown { body: body.into() })
    }

    /// JSON payload element.
    pub fn json(&mut self, body: serde_json::Value) -> ScriptResult<()> {
        self.enqueue(Element::Json { body })
    }

    /// Register any widget; the typed helpers below all funnel through
    /// here, and so does the component library above this crate.
    pub fn register_widget(
        &mut self,
        kind: &str,
        label: &str,
        value_kind: WidgetValueKind,
        default: Value,
        params: serde_json::Value,
        key: Option<&str>,
        callback: Option<WidgetCallback>,
    ) -> ScriptResult<Value> {
        let id = compute_widget_id(kind, &json!({ "label": label, "params": params }), key);
        let mut metadata = WidgetMetadata::new(id.clone(), kind, value_kind, default)
            .with_key(key)
            .with_fragment(self.fragment_stack.last().cloned());
        if let Some(callback) = callback {
            metadata = metadata.with_callback(callback);
        }
        let wire_default = metadata.default_value();
        let registered = self.state.register_widget(metadata)?;
        self.active_ids.insert(id.clone());
        self.enqueue(Element::Widget {
            id,
            kind: SmolStr::new(kind),
            label: label.to_string(),
            value_kind,
            default: weft_state::widget::value_to_wire(value_kind, &wire_default),
        })?;
        Ok(registered.value)
    }

    /// One-shot button; true exactly on the run that observed the press.
    pub fn button(&mut self, label: &str, key: Option<&str>) -> ScriptResult<bool> {
        let value = self.register_widget(
            "button",
            label,
            WidgetValueKind::Trigger,
            Value::Null,
            json!({}),
            key,
            None,
        )?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Checkbox with a default.
    pub fn checkbox(&mut self, label: &str, default: bool, key: Option<&str>) -> ScriptResult<bool> {
        let value = self.register_widget(
            "checkbox",
            label,
            WidgetValueKind::Bool,
            Value::Bool(default),
            json!({ "default": default }),
            key,
            None,
        )?;
        Ok(value.as_bool().unwrap_or(default))
    }

    /// Integer input with a default.
    pub fn number_input(
        &mut self,
        label: &str,
        default: i64,
        key: Option<&str>,
    ) -> ScriptResult<i64> {
        let value = self.register_widget(
            "number_input",
            label,
            WidgetValueKind::Int,
            Value::Int(default),
            json!({ "default": default }),
            key,
            None,
        )?;
        Ok(value.as_int().unwrap_or(default))
    }

    /// Float slider over an inclusive range.
    pub fn slider(
        &mut self,
        label: &str,
        min: f64,
        max: f64,
        default: f64,
        key: Option<&str>,
    ) -> ScriptResult<f64> {
        let value = self.register_widget(
            "slider",
            label,
            WidgetValueKind::Double,
            Value::Double(default),
            json!({ "min": min, "max": max }),
            key,
            None,
        )?;
        Ok(value.as_double().unwrap_or(default))
    }

    /// Single-line text input.
    pub fn text_input(
        &mut self,
        label: &str,
        default: &str,
        key: Option<&str>,
    ) -> ScriptResult<String> {
        let value = self.register_widget(
            "text_input",
            label,
            WidgetValueKind::String,
            Value::String(default.to_string()),
            json!({ "default": default }),
            key,
            None,
        )?;
        Ok(value
            .as_str()
            .map_or_else(|| default.to_string(), str::to_string))
    }

    /// Define and run a fragment inline. The body is stored so a
    /// fragment-scoped rerun can replay it alone.
    pub fn fragment(&mut self, id: &str, body: FragmentFn) -> ScriptResult<()> {
        self.fragments.insert(id, body.clone());
        self.run_fragment_body(id, &body)
    }

    /// Execute a fragment body inside its scope markers.
    pub(crate) fn run_fragment_body(&mut self, id: &str, body: &FragmentFn) -> ScriptResult<()> {
        self.executed_fragments.insert(SmolStr::new(id));
        self.fragment_stack.push(SmolStr::new(id));
        let result = body(self);
        self.fragment_stack.pop();
        result
    }

    /// Widget ids registered so far this run.
    pub(crate) fn active_ids(&self) -> &FxHashSet<SmolStr> {
        &self.active_ids
    }

    /// Fragment ids entered so far this run.
    pub(crate) fn executed_fragments(&self) -> &FxHashSet<SmolStr> {
        &self.executed_fragments
    }
}

/// Render a script failure as the inline exception element shown in place
/// of whatever would have rendered next.
#[must_use]
pub fn exception_element(err: &ScriptError) -> Element {
    match err {
        ScriptError::User(err) => Element::Exception {
            type_name: SmolStr::new_static("Error"),
            message: err.to_string(),
            stack: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
        },
        ScriptError::State(err) => Element::Exception {
            type_name: SmolStr::new_static(match err {
                StateError::KeyNotFound(_) => "KeyNotFound",
                StateError::MissingMetadata(_) => "MissingMetadata",
                StateError::DuplicateWidgetId { .. } => "DuplicateWidgetId",
                StateError::WidgetValueCommitted(_) => "WidgetValueCommitted",
                StateError::Interrupted(_) => "Interrupted",
            }),
            message: err.to_string(),
            stack: Vec::new(),
        },
        ScriptError::Interrupted(_) => Element::Exception {
            type_name: SmolStr::new_static("Interrupted"),
            message: err.to_string(),
            stack: Vec::new(),
        },
    }
}
