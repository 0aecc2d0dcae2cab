//! Perceive, match, act loop.
//!
//! Each iteration captures a snapshot, evaluates every active scene against
//! it, and runs the handler of the single matching scene. Scenes leave the
//! active set only through prune lists (or by being the init scene).

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

use super::context::ScenarioContext;
use super::result::ScenarioRunResult;
use super::scene::{Scene, SceneOutcome};
use crate::perception::Snapshot;
use crate::utils::VariableResolver;
use crate::AutodriveError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);
pub const DEFAULT_NO_MATCH_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Scene run once, unconditionally, before the loop starts.
    pub init_scene: Option<String>,
    /// Longest allowed gap since the last matched scene.
    pub no_match_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            init_scene: None,
            no_match_timeout: DEFAULT_NO_MATCH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

pub struct ScenarioEngine {
    active: IndexMap<String, Arc<Scene>>,
    options: EngineOptions,
}

enum Step {
    Idle,
    Matched(Arc<Scene>),
    Conflict(Vec<String>),
}

impl ScenarioEngine {
    /// Later scenes with a duplicate id replace earlier ones.
    pub fn new(scenes: Vec<Scene>, options: EngineOptions) -> Self {
        let active = scenes
            .into_iter()
            .map(|s| (s.id.clone(), Arc::new(s)))
            .collect();
        Self { active, options }
    }

    pub fn active_ids(&self) -> Vec<&str> {
        self.active.keys().map(String::as_str).collect()
    }

    /// Drive the run to a terminal status. The context snapshot is cleared on
    /// every exit.
    #[instrument(skip_all, fields(scenes = self.active.len()))]
    pub async fn run(mut self, ctx: &mut ScenarioContext) -> ScenarioRunResult {
        let result = self.drive(ctx).await;
        ctx.clear_snapshot();
        debug!(status = result.status.as_str(), last_scene = ?result.last_scene, "Scenario finished");
        result
    }

    async fn drive(&mut self, ctx: &mut ScenarioContext) -> ScenarioRunResult {
        if self.active.is_empty() {
            return ScenarioRunResult::empty();
        }
        let reporter = Arc::clone(ctx.reporter());
        let mut last_scene: Option<String> = None;
        let mut last_outcome = SceneOutcome::Continue;

        if let Some(init_id) = self.options.init_scene.clone() {
            match self.active.shift_remove(&init_id) {
                Some(scene) => {
                    if ctx.is_cancelled() {
                        return ScenarioRunResult::stopped(None, Some(AutodriveError::Cancelled));
                    }
                    ctx.enter_scene(&init_id);
                    if let Err(e) = scene.handler.handle(ctx).await {
                        reporter.on_error(&format!("init scene '{}' failed", init_id), Some(&e));
                    }
                }
                None => reporter.on_warning(&format!("init scene '{}' not found", init_id)),
            }
        }

        let mut last_match = Instant::now();
        while !self.active.is_empty() {
            let elapsed = last_match.elapsed();
            if elapsed > self.options.no_match_timeout {
                reporter.on_timeout(last_scene.as_deref(), elapsed);
                return ScenarioRunResult::timeout(
                    last_scene,
                    AutodriveError::Timeout(self.options.no_match_timeout.as_millis() as u64),
                );
            }
            if ctx.is_cancelled() {
                return ScenarioRunResult::stopped(last_scene, Some(AutodriveError::Cancelled));
            }

            let snapshot = match ctx.perception().capture().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    reporter.on_warning(&format!("snapshot capture failed: {}", e));
                    Snapshot::empty()
                }
            };
            let snapshot = ctx.update_snapshot(snapshot);
            if snapshot.is_empty() {
                self.pause(ctx).await;
                continue;
            }

            let resolver = VariableResolver::new(ctx.data_snapshot());
            let scene = match self.evaluate(&snapshot, &resolver) {
                Step::Idle => {
                    self.pause(ctx).await;
                    continue;
                }
                Step::Conflict(ids) => {
                    reporter.on_scene_conflict(&ids);
                    return ScenarioRunResult::failed(None, AutodriveError::SceneConflict(ids));
                }
                Step::Matched(scene) => scene,
            };

            last_scene = Some(scene.id.clone());
            reporter.on_scene_matched(&scene);
            for id in &scene.prune {
                self.active.shift_remove(id);
            }

            ctx.enter_scene(&scene.id);
            let outcome = match scene.handler.handle(ctx).await {
                Ok(SceneOutcome::Error) => {
                    reporter.on_error(&format!("scene '{}' reported an error", scene.id), None);
                    SceneOutcome::Error
                }
                Ok(outcome) => outcome,
                Err(e) => {
                    reporter.on_error(&format!("scene '{}' handler failed", scene.id), Some(&e));
                    if matches!(e, AutodriveError::Cancelled) {
                        return ScenarioRunResult::stopped(last_scene, Some(e));
                    }
                    SceneOutcome::Error
                }
            };
            match outcome {
                SceneOutcome::Success => return ScenarioRunResult::success(last_scene),
                SceneOutcome::Stop => return ScenarioRunResult::stopped(last_scene, None),
                SceneOutcome::Error | SceneOutcome::Continue => {}
            }
            last_outcome = outcome;
            last_match = Instant::now();
        }

        match last_outcome {
            SceneOutcome::Stop => ScenarioRunResult::stopped(last_scene, None),
            SceneOutcome::Error => ScenarioRunResult::failed(
                last_scene.clone(),
                AutodriveError::Script(format!(
                    "scene '{}' failed before the script finished",
                    last_scene.as_deref().unwrap_or("?")
                )),
            ),
            _ => ScenarioRunResult::success(last_scene),
        }
    }

    fn evaluate(&self, snapshot: &Snapshot, resolver: &VariableResolver) -> Step {
        let mut matched: Vec<&Arc<Scene>> = self
            .active
            .values()
            .filter(|scene| scene.matches(snapshot, resolver))
            .collect();
        match matched.len() {
            0 => Step::Idle,
            1 => Step::Matched(Arc::clone(matched.remove(0))),
            _ => {
                let ids: Vec<String> = matched.iter().map(|s| s.id.clone()).collect();
                warn!(scenes = ?ids, "Multiple scenes matched");
                Step::Conflict(ids)
            }
        }
    }

    async fn pause(&self, ctx: &ScenarioContext) {
        tokio::select! {
            _ = sleep(self.options.poll_interval) => {}
            _ = ctx.cancellation().cancelled() => {}
        }
    }
}
