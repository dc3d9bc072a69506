//! Runtime registry: session lifecycle, routing, fan-out.

mod common;

use std::sync::Arc;

use weft_proto::{BackMsg, ClientState, ForwardMsg};
use weft_runtime::{Config, ConfigValue, EngineError, Runtime, ScriptSource};

use common::{wait_until, RecordingClient, StaticSource};

fn text_source() -> Arc<dyn ScriptSource> {
    StaticSource::new(Arc::new(|ctx: &mut weft_runtime::ScriptCtx<'_>| {
        ctx.text("hello")
    })) as Arc<dyn ScriptSource>
}

#[test]
fn sessions_register_and_close_idempotently() {
    let runtime = Runtime::new(Config::new(), text_source());
    let client = RecordingClient::new();
    let id = runtime.create_session(client);
    assert_eq!(runtime.session_count(), 1);
    assert!(runtime.session(&id).is_some());

    runtime.close_session(&id);
    assert_eq!(runtime.session_count(), 0);
    // Closing again is a no-op.
    runtime.close_session(&id);
    runtime.close_session("never-existed");
}

#[test]
fn backmsgs_route_to_their_session() {
    let runtime = Runtime::new(Config::new(), text_source());
    let client = RecordingClient::new();
    let id = runtime.create_session(client.clone());

    runtime
        .handle_backmsg(
            &id,
            BackMsg::Rerun {
                client_state: ClientState::default(),
            },
        )
        .unwrap();

    // The session's own event loop drives delivery.
    wait_until(|| {
        client.count(|msg| matches!(msg, ForwardMsg::ScriptFinished(_))) >= 1
    });

    let unknown = runtime.handle_backmsg("missing", BackMsg::Heartbeat);
    assert!(matches!(unknown, Err(EngineError::SessionNotFound(_))));
}

#[test]
fn sweep_removes_disconnected_sessions() {
    let runtime = Runtime::new(Config::new(), text_source());
    let healthy = RecordingClient::new();
    let doomed = RecordingClient::new();
    doomed.disconnect_after(0);

    let healthy_id = runtime.create_session(healthy);
    let doomed_id = runtime.create_session(doomed);

    runtime
        .handle_backmsg(
            &doomed_id,
            BackMsg::Rerun {
                client_state: ClientState::default(),
            },
        )
        .unwrap();
    wait_until(|| {
        runtime
            .session(&doomed_id)
            .is_none_or(|session| session.is_defunct())
    });

    runtime.sweep_defunct();
    assert!(runtime.session(&doomed_id).is_none());
    assert!(runtime.session(&healthy_id).is_some());
}

#[test]
fn source_change_fans_out_to_run_on_save_sessions() {
    let mut config = Config::new();
    config
        .set("runner.run_on_save", ConfigValue::Bool(true))
        .unwrap();
    let runtime = Runtime::new(config, text_source());

    let first = RecordingClient::new();
    let second = RecordingClient::new();
    runtime.create_session(first.clone());
    runtime.create_session(second.clone());

    runtime.on_source_changed();

    for client in [&first, &second] {
        wait_until(|| {
            client.count(|msg| matches!(msg, ForwardMsg::NewSession { .. })) >= 1
        });
    }
}

#[test]
fn source_change_without_run_on_save_only_nudges() {
    let runtime = Runtime::new(Config::new(), text_source());
    let client = RecordingClient::new();
    runtime.create_session(client.clone());

    runtime.on_source_changed();
    wait_until(|| client.count(|msg| matches!(msg, ForwardMsg::PagesChanged { .. })) >= 1);
    assert_eq!(
        client.count(|msg| matches!(msg, ForwardMsg::NewSession { .. })),
        0
    );
}

#[test]
fn shutdown_closes_every_session() {
    let runtime = Runtime::new(Config::new(), text_source());
    runtime.create_session(RecordingClient::new());
    runtime.create_session(RecordingClient::new());
    assert_eq!(runtime.session_count(), 2);

    runtime.shutdown();
    assert_eq!(runtime.session_count(), 0);
    // Idempotent.
    runtime.shutdown();
}
