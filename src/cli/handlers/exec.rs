//! `exec`: dispatch one action in-process.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::cli::output::{output_json, print_error, print_hint, print_kv, print_success, OutputMode};
use crate::command::{CommandContext, LocalContext, ReportedEvent};
use crate::init::AppContext;
use crate::utils::task_action_script;

pub async fn handle_exec(ctx: &AppContext, action: &str, params: &str, mode: OutputMode) -> Result<()> {
    let params: Value = serde_json::from_str(params).context("--params must be a JSON object")?;
    if !params.is_object() {
        anyhow::bail!("--params must be a JSON object, got {}", params);
    }

    let (action, params) = local_action(action, params);
    let action = action.as_str();

    let mut local = LocalContext::new(action, params.clone());
    if let Some(device_id) = ctx.device_state.device_id().await {
        local = local.with_device_id(device_id);
    }
    let local = Arc::new(local);
    let result = ctx.bus.dispatch(local.clone(), action, &params).await?;

    if mode == OutputMode::Json {
        output_json(&json!({
            "command_id": local.command_id(),
            "result": result,
            "events": local.events(),
        }));
        return Ok(());
    }

    for event in local.events() {
        match event {
            ReportedEvent::Progress { stage, message, percent, .. } => {
                let pct = percent.map(|p| format!(" {}%", p)).unwrap_or_default();
                print_hint(&format!("[{}{}] {}", stage, pct, message));
            }
            ReportedEvent::Log { level, message, .. } => {
                print_hint(&format!("[{}] {}", level, message));
            }
        }
    }

    if result.success {
        print_success(&format!("{}: {}", action, result.message_or("done")));
    } else {
        print_error(&format!("{} failed: {}", action, result.message_or("no message")));
    }
    if let Some(payload) = result.render_payload().filter(|p| Some(p) != result.message.as_ref()) {
        print_kv("Result", &payload);
    }
    Ok(())
}

/// `start_task:<name>` entries are descriptor-only on the bus; locally they
/// run as `start_task` with the name filled in.
fn local_action(action: &str, mut params: Value) -> (String, Value) {
    let Some(script) = task_action_script(action) else {
        return (action.to_string(), params);
    };
    if let Some(map) = params.as_object_mut() {
        map.entry("task_name").or_insert_with(|| json!(script));
    }
    ("start_task".to_string(), params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_task_entry_runs_as_start_task() {
        let (action, params) = local_action("start_task:demo", json!({"config": {"n": 1}}));
        assert_eq!(action, "start_task");
        assert_eq!(params, json!({"config": {"n": 1}, "task_name": "demo"}));

        let (action, params) = local_action("press_back", json!({}));
        assert_eq!(action, "press_back");
        assert_eq!(params, json!({}));
    }
}
