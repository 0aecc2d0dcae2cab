//! Command bus behaviour through a fully wired agent context.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use autodrive::command::{CommandContextRef, LocalContext};
use autodrive::AutodriveError;
use common::TestApp;

const DEMO_PROJECT: &str = r#"
metadata:
  name: Demo
  version: "1.2"
  description: Opens the app and waits for the home screen
parameters:
  required:
    - name: account
      type: string
  optional:
    - name: rounds
      type: int
      default: 3
"#;

const DEMO_SCENES: &str = r#"
scenes:
  - id: home
    signature:
      required_all:
        text: Home
    handler: succeed
"#;

fn ctx(action: &str) -> CommandContextRef {
    Arc::new(LocalContext::new(action, json!({})))
}

fn entry<'a>(caps: &'a Value, action: &str) -> &'a Value {
    caps.as_array()
        .unwrap()
        .iter()
        .find(|e| e["action"] == action)
        .unwrap_or_else(|| panic!("no capability entry for {}", action))
}

#[tokio::test]
async fn test_params_are_validated_and_coerced() {
    let harness = TestApp::new().await;
    let bus = &harness.app.bus;

    let err = bus.dispatch(ctx("input_text"), "input_text", &json!({})).await.unwrap_err();
    assert!(matches!(err, AutodriveError::InvalidParameter { ref name, .. } if name == "text"));

    let pressed = bus
        .dispatch(ctx("press_key"), "press_key", &json!({"keycode": "4"}))
        .await
        .unwrap();
    assert!(pressed.success);
    assert_eq!(pressed.message.as_deref(), Some("pressed key 4"));

    let err = bus
        .dispatch(ctx("press_key"), "press_key", &json!({"keycode": "four"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AutodriveError::TypeMismatch { ref name, .. } if name == "keycode"));
}

#[tokio::test]
async fn test_unknown_and_descriptor_only_actions() {
    let harness = TestApp::new().await;
    let bus = &harness.app.bus;

    let err = bus.dispatch(ctx("fly"), "fly", &json!({})).await.unwrap_err();
    assert!(matches!(err, AutodriveError::UnknownAction(ref a) if a == "fly"));
    assert!(err.is_client_error());

    // stop_task is advertised but answered by the executor, never the bus.
    let err = bus.dispatch(ctx("stop_task"), "stop_task", &json!({})).await.unwrap_err();
    assert!(matches!(err, AutodriveError::NoHandler(_)));
}

#[tokio::test]
async fn test_dump_hierarchy_reads_current_screen() {
    let harness = TestApp::new().await;
    harness.show(&["Home", "Settings"]);

    let result = harness
        .app
        .bus
        .dispatch(ctx("dump_hierarchy"), "dump_hierarchy", &json!({}))
        .await
        .unwrap();

    let payload = result.payload.unwrap();
    assert_eq!(payload["node_count"], 3);
    assert_eq!(payload["hierarchy"]["children"][1]["text"], "Settings");
}

#[tokio::test]
async fn test_device_info_reports_identity() {
    let harness = TestApp::new().await;
    let local = Arc::new(LocalContext::new("device_info", json!({})).with_device_id("dev-42"));

    let result = harness
        .app
        .bus
        .dispatch(local, "device_info", &json!({}))
        .await
        .unwrap();

    let payload = result.payload.unwrap();
    assert_eq!(payload["device_id"], "dev-42");
    assert_eq!(payload["device_name"], "autodrive-agent");
    assert_eq!(payload["action_count"], json!(harness.app.bus.len()));
}

#[tokio::test]
async fn test_capabilities_list_every_action_and_script() {
    let harness = TestApp::with_scripts(&[("demo", DEMO_PROJECT, DEMO_SCENES)]).await;
    let caps = harness.app.bus.capabilities();

    for action in [
        "click",
        "swipe",
        "press_key",
        "press_back",
        "press_home",
        "input_text",
        "store_template",
        "find_template",
        "compare_images",
        "clear_templates",
        "dump_hierarchy",
        "device_info",
        "start_task",
        "stop_task",
    ] {
        entry(&caps, action);
    }

    let swipe = entry(&caps, "swipe");
    let steps = swipe["params"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "steps")
        .unwrap();
    assert_eq!(steps["default"], 50);

    let start = entry(&caps, "start_task");
    assert_eq!(start["meta"]["scripts"][0]["name"], "Demo");

    let demo = entry(&caps, "start_task:demo");
    assert_eq!(demo["description"], "Opens the app and waits for the home screen");
    let names: Vec<&str> = demo["params"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["task_name", "config.account", "config.rounds"]);
    assert_eq!(demo["params"][0]["default"], "demo");
    assert_eq!(demo["meta"]["version"], "1.2");
}
