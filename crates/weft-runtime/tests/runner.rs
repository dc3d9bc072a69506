//! ScriptRunner end-to-end behavior: rerun semantics, interruption,
//! coalescing, culling.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use smol_str::SmolStr;
use weft_proto::{ForwardMsg, ScriptFinishedStatus, WidgetStates, WireValue};
use weft_runtime::msg_queue::ForwardMsgQueue;
use weft_runtime::script::FragmentStorage;
use weft_runtime::{
    Config, RerunData, RunnerEvent, RunnerState, ScriptCtx, ScriptResult, ScriptRunner,
    ScriptSource,
};
use weft_state::{compute_widget_id, SafeSessionState, StateError, Value};

use common::{BrokenSource, StaticSource};

/// Shared fixture: one session's state, queue and fragment storage, with a
/// fresh runner per run the way a session spawns them.
struct Harness {
    state: SafeSessionState,
    queue: Arc<ForwardMsgQueue>,
    fragments: Arc<FragmentStorage>,
    config: Arc<Config>,
    events_tx: mpsc::Sender<RunnerEvent>,
    events_rx: mpsc::Receiver<RunnerEvent>,
}

impl Harness {
    fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            state: SafeSessionState::default(),
            queue: Arc::new(ForwardMsgQueue::new()),
            fragments: Arc::new(FragmentStorage::new()),
            config: Arc::new(Config::new()),
            events_tx,
            events_rx,
        }
    }

    fn runner(&self, source: &Arc<dyn ScriptSource>) -> ScriptRunner {
        let events_tx = self.events_tx.clone();
        ScriptRunner::new(
            "test-session",
            self.state.clone(),
            source.clone(),
            self.queue.clone(),
            self.fragments.clone(),
            self.config.clone(),
            Arc::new(move |event| {
                let _ = events_tx.send(event);
            }),
        )
    }

    fn run(&self, source: &Arc<dyn ScriptSource>, data: RerunData) {
        self.runner(source).run_to_shutdown(data);
    }

    fn drain_events(&self) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn source_of(
    body: impl Fn(&mut ScriptCtx<'_>) -> ScriptResult<()> + Send + Sync + 'static,
) -> Arc<dyn ScriptSource> {
    StaticSource::new(Arc::new(body)) as Arc<dyn ScriptSource>
}

fn button_id(label: &str) -> SmolStr {
    compute_widget_id("button", &json!({ "label": label, "params": {} }), None)
}

fn states_with(id: &SmolStr, value: WireValue) -> WidgetStates {
    let mut states = WidgetStates::new();
    states.set(id.clone(), value);
    states
}

#[test]
fn button_reports_false_on_both_untouched_runs() {
    let harness = Harness::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_in_script = observed.clone();
    let source = source_of(move |ctx: &mut ScriptCtx<'_>| {
        let pressed = ctx.button("Go", None)?;
        observed_in_script.lock().unwrap().push(pressed);
        Ok(())
    });

    harness.run(&source, RerunData::default());
    harness.run(&source, RerunData::default());

    assert_eq!(*observed.lock().unwrap(), vec![false, false]);
}

#[test]
fn trigger_value_is_seen_once_then_resets() {
    let harness = Harness::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_in_script = observed.clone();
    let source = source_of(move |ctx: &mut ScriptCtx<'_>| {
        let pressed = ctx.button("Go", None)?;
        observed_in_script.lock().unwrap().push(pressed);
        Ok(())
    });

    harness.run(&source, RerunData::default());
    harness.run(
        &source,
        RerunData {
            widget_states: Some(states_with(&button_id("Go"), WireValue::Trigger(true))),
            ..RerunData::default()
        },
    );
    // No new input: the press must not persist into run three.
    harness.run(&source, RerunData::default());

    assert_eq!(*observed.lock().unwrap(), vec![false, true, false]);
}

#[test]
fn conditionally_removed_widget_is_culled() {
    let harness = Harness::new();
    let render_widget = Arc::new(AtomicBool::new(true));
    let render_in_script = render_widget.clone();
    let source = source_of(move |ctx: &mut ScriptCtx<'_>| {
        if render_in_script.load(Ordering::SeqCst) {
            ctx.number_input("N", 0, Some("n"))?;
        }
        Ok(())
    });

    harness.run(&source, RerunData::default());
    let id = harness.state.with(|state| state.widget_id_for("n"));

    // Frontend sends 5, but the rerun no longer renders the widget.
    render_widget.store(false, Ordering::SeqCst);
    harness.run(
        &source,
        RerunData {
            widget_states: Some(states_with(&id, WireValue::Int(5))),
            ..RerunData::default()
        },
    );

    let lookup = harness.state.with(|state| state.get("n"));
    assert!(matches!(lookup, Err(StateError::KeyNotFound(_))));
}

#[test]
fn same_kind_same_params_distinct_keys_are_independent() {
    let harness = Harness::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_in_script = observed.clone();
    let source = source_of(move |ctx: &mut ScriptCtx<'_>| {
        let a = ctx.number_input("N", 0, Some("a"))?;
        let b = ctx.number_input("N", 0, Some("b"))?;
        observed_in_script.lock().unwrap().push((a, b));
        Ok(())
    });

    harness.run(&source, RerunData::default());
    let id_a = harness.state.with(|state| state.widget_id_for("a"));
    let id_b = harness.state.with(|state| state.widget_id_for("b"));
    assert_ne!(id_a, id_b);

    let mut states = WidgetStates::new();
    states.set(id_a, WireValue::Int(1));
    states.set(id_b, WireValue::Int(2));
    harness.run(
        &source,
        RerunData {
            widget_states: Some(states),
            ..RerunData::default()
        },
    );

    assert_eq!(*observed.lock().unwrap(), vec![(0, 0), (1, 2)]);
}

#[test]
fn stop_unwinds_an_infinite_loop_within_bounded_time() {
    let harness = Harness::new();
    let source = source_of(|ctx: &mut ScriptCtx<'_>| {
        loop {
            ctx.text("tick")?;
            std::thread::sleep(Duration::from_millis(1));
        }
    });

    let mut handle = harness.runner(&source).spawn(RerunData::default()).unwrap();
    // Let the loop actually start emitting.
    let deadline = Instant::now() + Duration::from_secs(5);
    while harness.queue.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }

    let stop_requested = Instant::now();
    handle.request_stop();
    handle.join().unwrap();
    assert!(stop_requested.elapsed() < Duration::from_secs(5));
    assert_eq!(handle.state(), RunnerState::Shutdown);

    // A stop is a success, not an error.
    let events = harness.drain_events();
    let stopped: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            RunnerEvent::ScriptStopped { status, .. } => Some(status.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(stopped, vec![ScriptFinishedStatus::Success]);
}

#[test]
fn rapid_rerun_requests_coalesce_into_one_run_with_latest_data() {
    let harness = Harness::new();
    let runs = Arc::new(Mutex::new(Vec::new()));
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let go_rx = Arc::new(Mutex::new(go_rx));

    let runs_in_script = runs.clone();
    let source = source_of(move |ctx: &mut ScriptCtx<'_>| {
        let first_run = {
            let mut runs = runs_in_script.lock().unwrap();
            runs.push(ctx.query_string().to_string());
            runs.len() == 1
        };
        if first_run {
            // Hold the first run open so requests can pile up behind it.
            let _ = go_rx.lock().unwrap().recv();
        }
        ctx.text("done")?;
        Ok(())
    });

    let mut handle = harness.runner(&source).spawn(RerunData::default()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while runs.lock().unwrap().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }

    for tag in ["r1", "r2", "r3"] {
        assert!(handle.request_rerun(RerunData {
            query_string: tag.into(),
            ..RerunData::default()
        }));
    }
    go_tx.send(()).unwrap();
    handle.join().unwrap();

    // Exactly one follow-up run, and it used the latest data.
    assert_eq!(*runs.lock().unwrap(), vec![String::new(), "r3".to_string()]);
}

#[test]
fn compile_error_is_a_distinct_terminal_state() {
    let harness = Harness::new();
    let source = Arc::new(BrokenSource) as Arc<dyn ScriptSource>;
    harness.run(&source, RerunData::default());

    let events = harness.drain_events();
    let has_compile_error = events.iter().any(|event| {
        matches!(
            event,
            RunnerEvent::ScriptStopped {
                status: ScriptFinishedStatus::CompileError { .. },
                ..
            }
        )
    });
    assert!(has_compile_error, "events: {events:?}");

    // The session survives: a later run against a healthy source works.
    let healthy = source_of(|ctx: &mut ScriptCtx<'_>| ctx.text("ok"));
    harness.run(&healthy, RerunData::default());
    let events = harness.drain_events();
    assert!(events.iter().any(|event| matches!(
        event,
        RunnerEvent::ScriptStopped {
            status: ScriptFinishedStatus::Success,
            ..
        }
    )));
}

#[test]
fn user_error_renders_inline_and_run_still_succeeds() {
    let harness = Harness::new();
    let source = source_of(|ctx: &mut ScriptCtx<'_>| {
        ctx.text("before the failure")?;
        Err(anyhow::anyhow!("user code exploded").into())
    });
    harness.run(&source, RerunData::default());

    let events = harness.drain_events();
    assert!(events.iter().any(|event| matches!(
        event,
        RunnerEvent::ScriptStopped {
            status: ScriptFinishedStatus::Success,
            ..
        }
    )));

    let queued = harness.queue.flush();
    // Everything rendered before the failure stays visible, the failure
    // itself renders where the next element would have gone.
    assert_eq!(queued.len(), 2);
    assert!(matches!(
        &queued[0],
        ForwardMsg::Delta(delta) if delta.element.tag() == "text"
    ));
    assert!(matches!(
        &queued[1],
        ForwardMsg::Delta(delta) if delta.element.tag() == "exception"
    ));
}

#[test]
fn events_preserve_emission_order() {
    let harness = Harness::new();
    let source = source_of(|ctx: &mut ScriptCtx<'_>| {
        ctx.text("one")?;
        ctx.text("two")?;
        Ok(())
    });
    harness.run(&source, RerunData::default());

    let tags: Vec<&str> = harness
        .drain_events()
        .iter()
        .map(|event| match event {
            RunnerEvent::ScriptStarted { .. } => "started",
            RunnerEvent::ForwardMsgEnqueued => "enqueued",
            RunnerEvent::ScriptStopped { .. } => "stopped",
            RunnerEvent::Shutdown => "shutdown",
        })
        .collect();
    assert_eq!(
        tags,
        ["started", "enqueued", "enqueued", "stopped", "shutdown"]
    );
}

#[test]
fn session_state_writes_survive_between_runs() {
    let harness = Harness::new();
    let observed = Arc::new(AtomicUsize::new(0));
    let observed_in_script = observed.clone();
    let source = source_of(move |ctx: &mut ScriptCtx<'_>| {
        let count = match ctx.get("count") {
            Ok(Value::Int(n)) => n,
            _ => 0,
        };
        ctx.set("count", count + 1)?;
        observed_in_script.store(usize::try_from(count + 1).unwrap(), Ordering::SeqCst);
        Ok(())
    });

    harness.run(&source, RerunData::default());
    harness.run(&source, RerunData::default());
    harness.run(&source, RerunData::default());
    assert_eq!(observed.load(Ordering::SeqCst), 3);
}
