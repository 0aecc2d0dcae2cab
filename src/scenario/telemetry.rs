use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use super::reporter::ScenarioReporter;
use super::result::ScenarioRunResult;
use super::scene::Scene;
use crate::AutodriveError;

#[derive(Debug, Default)]
struct Metrics {
    matched_scenes: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
    timeout: bool,
}

/// Collects run metrics for the task summary.
pub struct TelemetryCollector {
    started: Instant,
    metrics: Mutex<Metrics>,
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            metrics: Mutex::default(),
        }
    }

    fn with<F: FnOnce(&mut Metrics)>(&self, f: F) {
        if let Ok(mut m) = self.metrics.lock() {
            f(&mut m);
        }
    }

    pub fn matched_scenes(&self) -> Vec<String> {
        self.metrics
            .lock()
            .map(|m| m.matched_scenes.clone())
            .unwrap_or_default()
    }

    /// Render metrics, folding in the final status when known.
    pub fn to_json(&self, result: Option<&ScenarioRunResult>) -> Value {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let m = match self.metrics.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out = json!({
            "duration_ms": duration_ms,
            "matched_count": m.matched_scenes.len(),
            "matched_scenes": m.matched_scenes,
            "warnings": m.warnings,
            "errors": m.errors,
            "timeout": m.timeout,
        });
        if let (Some(result), Some(obj)) = (result, out.as_object_mut()) {
            obj.insert("status".into(), json!(result.status.as_str()));
            if let Some(last) = &result.last_scene {
                obj.insert("last_scene".into(), json!(last));
            }
        }
        out
    }
}

impl ScenarioReporter for TelemetryCollector {
    fn on_warning(&self, message: &str) {
        self.with(|m| m.warnings.push(message.to_string()));
    }

    fn on_error(&self, message: &str, error: Option<&AutodriveError>) {
        let entry = match error {
            Some(e) => format!("{} [{}]", message, e.error_code()),
            None => message.to_string(),
        };
        self.with(|m| m.errors.push(entry));
    }

    fn on_scene_matched(&self, scene: &Scene) {
        self.with(|m| m.matched_scenes.push(scene.id.clone()));
    }

    fn on_scene_conflict(&self, scene_ids: &[String]) {
        let entry = format!("scene conflict: {}", scene_ids.join(","));
        self.with(|m| m.errors.push(entry));
    }

    fn on_timeout(&self, _last_scene: Option<&str>, _elapsed: Duration) {
        self.with(|m| m.timeout = true);
    }
}
