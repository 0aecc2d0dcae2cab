use std::time::Duration;

use serde_json::json;

use crate::command::{CommandContextRef, LogLevel};
use crate::scenario::{Scene, ScenarioReporter};
use crate::AutodriveError;

/// Forwards scenario events to the command that started the run.
pub struct CommandScenarioReporter {
    ctx: CommandContextRef,
}

impl CommandScenarioReporter {
    pub fn new(ctx: CommandContextRef) -> Self {
        Self { ctx }
    }
}

impl ScenarioReporter for CommandScenarioReporter {
    fn on_info(&self, message: &str) {
        self.ctx.report_progress("scene.info", message, None, None);
    }

    fn on_warning(&self, message: &str) {
        self.ctx.report_log(LogLevel::Warning, message, None);
    }

    fn on_error(&self, message: &str, error: Option<&AutodriveError>) {
        let extra = match error {
            Some(e) => json!({
                "message": message,
                "error_code": e.error_code(),
                "error_message": e.to_string(),
            }),
            None => json!({ "message": message }),
        };
        self.ctx.report_log(LogLevel::Error, message, Some(extra));
    }

    fn on_scene_matched(&self, scene: &Scene) {
        self.ctx.report_progress(
            "scene.matched",
            &format!("matched scene {}", scene.id),
            None,
            Some(json!({
                "scene_id": scene.id,
                "description": scene.description.as_deref().unwrap_or(""),
            })),
        );
    }

    fn on_scene_conflict(&self, scene_ids: &[String]) {
        self.ctx.report_log(
            LogLevel::Error,
            "scene conflict",
            Some(json!({ "conflicts": scene_ids })),
        );
    }

    fn on_timeout(&self, last_scene: Option<&str>, elapsed: Duration) {
        self.ctx.report_log(
            LogLevel::Error,
            "no scene matched before timeout",
            Some(json!({
                "last_scene": last_scene,
                "elapsed_ms": elapsed.as_millis() as u64,
            })),
        );
    }
}
