use std::sync::Arc;

use tracing::{info, instrument};

use super::context::ScenarioContext;
use super::engine::{EngineOptions, ScenarioEngine};
use super::result::ScenarioRunResult;
use super::scene::Scene;
use crate::guard::RunGuard;
use crate::vision::VisionProvider;
use crate::AutodriveError;

/// Clears cached templates when dropped, whichever way the run ends.
struct TemplateCleanup(Arc<dyn VisionProvider>);

impl Drop for TemplateCleanup {
    fn drop(&mut self) {
        self.0.clear_templates();
    }
}

/// Runs scripts one at a time per script id.
pub struct ScenarioRunner {
    guard: Arc<RunGuard>,
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new(Arc::new(RunGuard::new()))
    }
}

impl ScenarioRunner {
    pub fn new(guard: Arc<RunGuard>) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &Arc<RunGuard> {
        &self.guard
    }

    #[instrument(skip(self, scenes, ctx, options), fields(scenes = scenes.len()))]
    pub async fn run(
        &self,
        script_id: &str,
        scenes: Vec<Scene>,
        ctx: &mut ScenarioContext,
        options: EngineOptions,
    ) -> ScenarioRunResult {
        let Some(_lease) = self.guard.try_lease(script_id) else {
            info!(script = script_id, "Script already running");
            return ScenarioRunResult::failed(None, AutodriveError::DeviceBusy);
        };
        let _cleanup = TemplateCleanup(Arc::clone(ctx.vision()));
        ScenarioEngine::new(scenes, options).run(ctx).await
    }
}
