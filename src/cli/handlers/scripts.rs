//! Script inspection: list, show, check.

use anyhow::Result;
use serde_json::json;

use crate::cli::output::{
    output_json, print_error, print_header, print_hint, print_kv, print_success, print_table,
    OutputMode,
};
use crate::init::AppContext;

pub async fn handle_list(ctx: &AppContext, mode: OutputMode) -> Result<()> {
    let scripts = ctx.catalog.cached();

    if mode == OutputMode::Json {
        let list: Vec<_> = scripts.iter().map(|(_, s)| s.to_json()).collect();
        output_json(&list);
        return Ok(());
    }

    print_header(&format!("Scripts ({})", scripts.len()));
    let rows: Vec<Vec<String>> = scripts
        .iter()
        .map(|(dir, s)| {
            vec![
                dir.clone(),
                s.version.clone().unwrap_or_else(|| "-".into()),
                s.scenes.len().to_string(),
                s.description.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["Script", "Version", "Scenes", "Description"], rows);
    if scripts.is_empty() {
        print_hint(&format!(
            "Add scripts under {}",
            ctx.config.scripts_dir(&ctx.data_path).display()
        ));
    }
    Ok(())
}

pub async fn handle_show(ctx: &AppContext, name: &str, mode: OutputMode) -> Result<()> {
    let script = ctx.catalog.require_script(name).await?;

    if mode == OutputMode::Json {
        let mut value = script.to_json();
        value["scenes"] = json!(script
            .scenes
            .iter()
            .map(|s| json!({
                "id": s.id,
                "description": s.description,
                "handler": s.handler,
                "del_scenes": s.del_scenes,
            }))
            .collect::<Vec<_>>());
        output_json(&value);
        return Ok(());
    }

    print_header(&script.name);
    if let Some(version) = &script.version {
        print_kv("Version", version);
    }
    if let Some(description) = &script.description {
        print_kv("Description", description);
    }
    if let Some(init) = &script.init_scene {
        print_kv("Init scene", init);
    }

    println!();
    println!("Parameters:");
    let rows: Vec<Vec<String>> = script
        .parameters
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.param_type.clone(),
                if p.required { "yes" } else { "no" }.to_string(),
                p.default.as_ref().map(|d| d.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["Name", "Type", "Required", "Default"], rows);

    println!();
    println!("Scenes:");
    let rows: Vec<Vec<String>> = script
        .scenes
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.handler.clone().unwrap_or_else(|| crate::script::DEFAULT_HANDLER.into()),
                s.del_scenes.join(", "),
            ]
        })
        .collect();
    print_table(&["Scene", "Handler", "Prunes"], rows);
    Ok(())
}

pub async fn handle_check(ctx: &AppContext, name: &str, mode: OutputMode) -> Result<()> {
    let script = ctx.catalog.require_script(name).await?;
    match script.materialize(&ctx.handlers) {
        Ok(scenes) => {
            if mode == OutputMode::Json {
                output_json(&json!({"status": "ok", "script": script.name, "scenes": scenes.len()}));
            } else {
                print_success(&format!("{}: {} scenes, all handlers resolved", script.name, scenes.len()));
            }
            Ok(())
        }
        Err(e) => {
            if mode == OutputMode::Json {
                output_json(&json!({
                    "status": "error",
                    "script": script.name,
                    "error_code": e.error_code(),
                    "message": e.to_string(),
                }));
            } else {
                print_error(&format!("{}: {}", script.name, e));
            }
            Err(e.into())
        }
    }
}
