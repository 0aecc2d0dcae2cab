//! Scenario event sinks.
//!
//! Engines report what they see through [`ScenarioReporter`]. Implementations
//! are fire-and-forget and must never fail the run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::scene::Scene;
use crate::AutodriveError;

pub trait ScenarioReporter: Send + Sync {
    fn on_info(&self, _message: &str) {}

    fn on_warning(&self, _message: &str) {}

    fn on_error(&self, _message: &str, _error: Option<&AutodriveError>) {}

    fn on_scene_matched(&self, _scene: &Scene) {}

    fn on_scene_conflict(&self, _scene_ids: &[String]) {}

    fn on_timeout(&self, _last_scene: Option<&str>, _elapsed: Duration) {}
}

pub struct NoopReporter;

impl ScenarioReporter for NoopReporter {}

pub fn noop_reporter() -> Arc<dyn ScenarioReporter> {
    Arc::new(NoopReporter)
}

/// Writes every event to the tracing log.
pub struct TracingReporter {
    script: String,
}

impl TracingReporter {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl ScenarioReporter for TracingReporter {
    fn on_info(&self, message: &str) {
        info!(script = %self.script, "{}", message);
    }

    fn on_warning(&self, message: &str) {
        warn!(script = %self.script, "{}", message);
    }

    fn on_error(&self, message: &str, err: Option<&AutodriveError>) {
        match err {
            Some(e) => error!(script = %self.script, error = %e, "{}", message),
            None => error!(script = %self.script, "{}", message),
        }
    }

    fn on_scene_matched(&self, scene: &Scene) {
        debug!(script = %self.script, scene = %scene.id, "Scene matched");
    }

    fn on_scene_conflict(&self, scene_ids: &[String]) {
        warn!(script = %self.script, scenes = ?scene_ids, "Scene conflict");
    }

    fn on_timeout(&self, last_scene: Option<&str>, elapsed: Duration) {
        warn!(
            script = %self.script,
            last_scene = last_scene.unwrap_or("none"),
            elapsed_ms = elapsed.as_millis() as u64,
            "No scene matched before timeout"
        );
    }
}

/// Fans every event out to several reporters.
#[derive(Default)]
pub struct CompositeReporter {
    delegates: Vec<Arc<dyn ScenarioReporter>>,
}

impl CompositeReporter {
    pub fn new(delegates: Vec<Arc<dyn ScenarioReporter>>) -> Self {
        Self { delegates }
    }

    pub fn push(&mut self, reporter: Arc<dyn ScenarioReporter>) {
        self.delegates.push(reporter);
    }
}

impl ScenarioReporter for CompositeReporter {
    fn on_info(&self, message: &str) {
        self.delegates.iter().for_each(|d| d.on_info(message));
    }

    fn on_warning(&self, message: &str) {
        self.delegates.iter().for_each(|d| d.on_warning(message));
    }

    fn on_error(&self, message: &str, err: Option<&AutodriveError>) {
        self.delegates.iter().for_each(|d| d.on_error(message, err));
    }

    fn on_scene_matched(&self, scene: &Scene) {
        self.delegates.iter().for_each(|d| d.on_scene_matched(scene));
    }

    fn on_scene_conflict(&self, scene_ids: &[String]) {
        self.delegates
            .iter()
            .for_each(|d| d.on_scene_conflict(scene_ids));
    }

    fn on_timeout(&self, last_scene: Option<&str>, elapsed: Duration) {
        self.delegates
            .iter()
            .for_each(|d| d.on_timeout(last_scene, elapsed));
    }
}
