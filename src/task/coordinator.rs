use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use super::binder::TaskRequest;
use super::reporter::CommandScenarioReporter;
use crate::command::{CommandContextRef, CommandResult};
use crate::device::DeviceActions;
use crate::perception::PerceptionProvider;
use crate::scenario::{
    CompositeReporter, EngineOptions, RunStatus, ScenarioContext, ScenarioReporter,
    ScenarioRunResult, ScenarioRunner, TelemetryCollector, TracingReporter,
    DEFAULT_NO_MATCH_TIMEOUT, DEFAULT_POLL_INTERVAL,
};
use crate::script::HandlerRegistry;
use crate::vision::VisionProvider;
use crate::AutodriveError;

/// Backends a scenario run talks to.
#[derive(Clone)]
pub struct ScenarioProviders {
    pub perception: Arc<dyn PerceptionProvider>,
    pub device: Arc<dyn DeviceActions>,
    pub vision: Arc<dyn VisionProvider>,
}

/// Turns a bound task request into a scenario run and its command result.
pub struct ScenarioRunCoordinator {
    runner: Arc<ScenarioRunner>,
    handlers: HandlerRegistry,
    providers: ScenarioProviders,
    poll_interval: Duration,
    no_match_timeout: Duration,
}

impl ScenarioRunCoordinator {
    pub fn new(
        runner: Arc<ScenarioRunner>,
        handlers: HandlerRegistry,
        providers: ScenarioProviders,
    ) -> Self {
        Self {
            runner,
            handlers,
            providers,
            poll_interval: DEFAULT_POLL_INTERVAL,
            no_match_timeout: DEFAULT_NO_MATCH_TIMEOUT,
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, no_match_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.no_match_timeout = no_match_timeout;
        self
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    #[instrument(skip_all, fields(task = %request.task_name))]
    pub async fn execute(
        &self,
        ctx: CommandContextRef,
        request: TaskRequest,
    ) -> Result<CommandResult, AutodriveError> {
        let scenes = request.script.materialize(&self.handlers)?;
        let telemetry = Arc::new(TelemetryCollector::new());
        let sinks: Vec<Arc<dyn ScenarioReporter>> = vec![
            Arc::new(CommandScenarioReporter::new(Arc::clone(&ctx))),
            Arc::new(TracingReporter::new(request.task_name.clone())),
            telemetry.clone(),
        ];
        let reporter = CompositeReporter::new(sinks);
        let mut scenario = ScenarioContext::builder(
            Arc::clone(&self.providers.perception),
            Arc::clone(&self.providers.device),
            Arc::clone(&self.providers.vision),
        )
        .data(request.context_data.clone())
        .reporter(Arc::new(reporter))
        .cancellation(ctx.cancellation().clone())
        .build();
        let options = EngineOptions {
            init_scene: request.script.init_scene.clone(),
            no_match_timeout: self.no_match_timeout,
            poll_interval: self.poll_interval,
        };

        ctx.report_progress(
            "task.start",
            &format!("starting task {}", request.task_name),
            Some(0),
            None,
        );
        let run = self
            .runner
            .run(&request.task_name, scenes, &mut scenario, options)
            .await;
        info!(
            status = run.status.as_str(),
            last_scene = ?run.last_scene,
            error = ?run.error.as_ref().map(|e| e.to_string()),
            "Scenario run finished"
        );

        let summary = summary(&request, &run, &telemetry);
        let (stage, message, percent) = match run.status {
            RunStatus::Success => ("task.finish", "task completed", Some(100)),
            RunStatus::Stopped => ("task.stop", "task stopped", None),
            RunStatus::Timeout => ("task.timeout", "task timed out", None),
            RunStatus::Failed => ("task.error", "task failed", None),
            RunStatus::Empty => ("task.error", "no scenes loaded", None),
        };
        ctx.report_progress(stage, message, percent, Some(summary.clone()));

        Ok(if run.is_success() {
            CommandResult::success_with_message(summary, message)
        } else {
            CommandResult::failure_with_payload(message, summary)
        })
    }
}

fn summary(request: &TaskRequest, run: &ScenarioRunResult, telemetry: &TelemetryCollector) -> Value {
    let mut out = Map::new();
    out.insert("task_name".into(), json!(request.task_name));
    out.insert("script".into(), json!(request.script.name));
    out.insert("status".into(), json!(run.status.as_str()));
    if let Some(scene) = &run.last_scene {
        out.insert("last_scene".into(), json!(scene));
    }
    if let Some(error) = &run.error {
        out.insert("error".into(), json!(error.to_string()));
    }
    if !request.config.is_empty() {
        out.insert("config".into(), Value::Object(request.config.clone()));
    }
    out.insert("metrics".into(), telemetry.to_json(Some(run)));
    Value::Object(out)
}
