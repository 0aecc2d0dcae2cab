//! Single-flight execution and the results it reports.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use autodrive::command::{CommandBus, CommandDescriptor, CommandResult};
use autodrive::executor::ExecutionCoordinator;
use autodrive::session::{Envelope, Inbound, InboundCommand};
use autodrive::AutodriveError;
use common::{wait_until, RecordingOutbound};

fn test_bus() -> Arc<CommandBus> {
    let bus = Arc::new(CommandBus::new());
    bus.register_fn(CommandDescriptor::new("echo"), |_ctx, params| async move {
        Ok(Some(CommandResult::success_with_message(
            Value::Object(params),
            "echoed",
        )))
    });
    // Runs until cancelled.
    bus.register_fn(CommandDescriptor::new("wait"), |ctx, _params| async move {
        ctx.cancellation().cancelled().await;
        Ok(Some(CommandResult::failure("interrupted")))
    });
    bus.register_fn(CommandDescriptor::new("unplug"), |_ctx, _params| async move {
        Err(AutodriveError::Device("usb gone".into()))
    });
    bus.register_fn(CommandDescriptor::new("decline"), |_ctx, _params| async move {
        Ok(Some(CommandResult::failure_with_payload("not today", json!({"retry_in": 5}))))
    });
    bus
}

fn command(id: Option<&str>, action: &str, params: Value) -> InboundCommand {
    InboundCommand {
        command_id: id.map(str::to_string),
        action: action.to_string(),
        params,
        user_id: Some("user-7".to_string()),
    }
}

fn setup() -> (Arc<ExecutionCoordinator>, Arc<RecordingOutbound>) {
    let outbound = RecordingOutbound::new(Some("dev-1"));
    let executor = ExecutionCoordinator::start(test_bus(), outbound.clone());
    (executor, outbound)
}

#[tokio::test]
async fn test_success_reports_result_then_finish() {
    let (executor, outbound) = setup();

    executor.accept(command(Some("c1"), "echo", json!({"n": 1})));
    wait_until("finish progress", || outbound.stages_for("c1").len() == 2).await;

    let result = outbound.result_for("c1").unwrap();
    assert!(result.is_success());
    assert_eq!(result.result.as_deref(), Some(r#"{"n":1}"#));
    assert_eq!(result.user_id.as_deref(), Some("user-7"));
    assert_eq!(result.device_id.as_deref(), Some("dev-1"));
    assert_eq!(result.action.as_deref(), Some("echo"));
    assert_eq!(outbound.stages_for("c1"), vec!["start", "finish"]);

    // The result goes out before the finish event.
    let sent = outbound.sent();
    let result_at = sent
        .iter()
        .position(|m| matches!(m, common::harness::Sent::Result(_)))
        .unwrap();
    let finish_at = sent
        .iter()
        .position(|m| matches!(m, common::harness::Sent::Progress(p) if p.stage == "finish"))
        .unwrap();
    assert!(result_at < finish_at);
    wait_until("slot to clear", || executor.current_task().is_none()).await;
}

#[tokio::test]
async fn test_second_command_is_rejected_while_busy() {
    let (executor, outbound) = setup();

    executor.accept(command(Some("long"), "wait", json!({})));
    wait_until("long command to start", || !outbound.stages_for("long").is_empty()).await;
    assert_eq!(executor.current_task().as_deref(), Some("wait"));

    executor.accept(command(Some("c2"), "echo", json!({})));
    let busy = outbound.result_for("c2").unwrap();
    assert!(!busy.is_success());
    assert_eq!(busy.error_message.as_deref(), Some("device busy"));
    assert_eq!(busy.action.as_deref(), Some("echo"));

    executor.accept(command(Some("s1"), "stop_task", json!({})));
    let stop = outbound.result_for("s1").unwrap();
    assert!(stop.is_success());
    assert_eq!(stop.result.as_deref(), Some("cancel requested"));
    assert_eq!(stop.action.as_deref(), Some("stop_task"));

    wait_until("cancelled result", || outbound.result_for("long").is_some()).await;
    let long = outbound.result_for("long").unwrap();
    assert_eq!(long.error_message.as_deref(), Some("command cancelled"));
    assert_eq!(outbound.stages_for("long"), vec!["start", "error"]);

    // The slot frees up once the worker finishes.
    wait_until("slot to clear", || executor.current_task().is_none()).await;
    executor.accept(command(Some("c3"), "echo", json!({})));
    wait_until("c3 result", || outbound.result_for("c3").is_some()).await;
    assert!(outbound.result_for("c3").unwrap().is_success());
}

#[tokio::test]
async fn test_stop_without_running_task() {
    let (executor, outbound) = setup();

    executor.accept(command(Some("s1"), "stop_task", json!({})));

    let stop = outbound.result_for("s1").unwrap();
    assert!(!stop.is_success());
    assert_eq!(stop.error_message.as_deref(), Some("no running task"));
}

#[tokio::test]
async fn test_missing_command_id_is_generated() {
    let (executor, outbound) = setup();

    executor.accept(command(None, "echo", json!({})));
    wait_until("result", || !outbound.results().is_empty()).await;

    let result = &outbound.results()[0];
    assert!(uuid::Uuid::parse_str(&result.command_id).is_ok());
    assert!(result.is_success());
}

#[tokio::test]
async fn test_handler_error_becomes_failed_result() {
    let (executor, outbound) = setup();

    executor.accept(command(Some("u1"), "unplug", json!({})));
    wait_until("result", || outbound.result_for("u1").is_some()).await;

    let result = outbound.result_for("u1").unwrap();
    assert_eq!(result.error_message.as_deref(), Some("device error: usb gone"));
    let error = outbound
        .sent()
        .into_iter()
        .find_map(|m| match m {
            common::harness::Sent::Progress(p) if p.stage == "error" => Some(p),
            _ => None,
        })
        .unwrap();
    assert_eq!(error.extra.unwrap()["error_code"], "DEVICE_ERROR");
}

#[tokio::test]
async fn test_failed_result_keeps_payload() {
    let (executor, outbound) = setup();

    executor.accept(command(Some("d1"), "decline", json!({})));
    wait_until("result", || outbound.result_for("d1").is_some()).await;

    let result = outbound.result_for("d1").unwrap();
    assert_eq!(result.error_message.as_deref(), Some("not today"));
    assert_eq!(result.result.as_deref(), Some(r#"{"retry_in":5}"#));
}

#[tokio::test]
async fn test_unknown_action_fails_without_blocking() {
    let (executor, outbound) = setup();

    executor.accept(command(Some("x1"), "teleport", json!({})));
    wait_until("result", || outbound.result_for("x1").is_some()).await;
    assert_eq!(
        outbound.result_for("x1").unwrap().error_message.as_deref(),
        Some("unknown action: teleport")
    );

    wait_until("slot to clear", || executor.current_task().is_none()).await;
    executor.accept(command(Some("x2"), "echo", json!({})));
    wait_until("result", || outbound.result_for("x2").is_some()).await;
    assert!(outbound.result_for("x2").unwrap().is_success());
}

#[tokio::test]
async fn test_frame_without_action_is_answered() {
    let (executor, outbound) = setup();
    let frame = Envelope::parse(
        r#"{"type":"command","data":{"command_id":42,"params":{}}}"#,
    )
    .unwrap();
    let command = match Inbound::from_envelope(frame) {
        Inbound::Command(command) => command,
        other => panic!("expected a command, got {:?}", other),
    };

    executor.accept(command);
    wait_until("result", || outbound.result_for("42").is_some()).await;

    let result = outbound.result_for("42").unwrap();
    assert!(!result.is_success());
    assert!(result
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("unknown action")));
}

#[tokio::test]
async fn test_stopped_coordinator_rejects_commands() {
    let (executor, outbound) = setup();

    executor.stop();
    executor.join().await;
    assert!(!executor.is_running());

    executor.accept(command(Some("late"), "echo", json!({})));
    let late = outbound.result_for("late").unwrap();
    assert_eq!(late.error_message.as_deref(), Some("controller not running"));
}
