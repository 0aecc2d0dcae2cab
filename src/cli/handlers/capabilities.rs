//! `capabilities`: the action listing sent in `session_init`.

use anyhow::Result;
use serde_json::Value;

use crate::cli::output::{output_json, print_header, print_table, OutputMode};
use crate::init::AppContext;

pub fn handle_capabilities(ctx: &AppContext, mode: OutputMode) -> Result<()> {
    let capabilities = ctx.bus.capabilities();

    if mode == OutputMode::Json {
        output_json(&capabilities);
        return Ok(());
    }

    print_header(&format!("Capabilities ({} actions)", ctx.bus.len()));
    let rows: Vec<Vec<String>> = capabilities
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|entry| {
            vec![
                entry["action"].as_str().unwrap_or_default().to_string(),
                param_summary(&entry["params"]),
                entry["description"].as_str().unwrap_or_default().to_string(),
            ]
        })
        .collect();
    print_table(&["Action", "Parameters", "Description"], rows);
    Ok(())
}

/// `name:type` list, required parameters marked with `*`.
fn param_summary(params: &Value) -> String {
    params
        .as_array()
        .map(|list| {
            list.iter()
                .map(|p| {
                    let marker = if p["required"].as_bool().unwrap_or(false) { "*" } else { "" };
                    format!(
                        "{}{}:{}",
                        p["name"].as_str().unwrap_or_default(),
                        marker,
                        p["type"].as_str().unwrap_or_default()
                    )
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}
