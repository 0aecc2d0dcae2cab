use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::binder::ScenarioParameterBinder;
use super::catalog::ScenarioCatalog;
use super::coordinator::ScenarioRunCoordinator;
use crate::command::{CommandBus, CommandContextRef, CommandDescriptor, HandlerOutput, ParameterSpec};
use crate::utils::TASK_ACTION_PREFIX;

/// Entry point for script tasks: binding, execution and capability entries.
pub struct ScenarioTaskService {
    catalog: Arc<ScenarioCatalog>,
    binder: ScenarioParameterBinder,
    coordinator: ScenarioRunCoordinator,
}

impl ScenarioTaskService {
    pub fn new(catalog: Arc<ScenarioCatalog>, coordinator: ScenarioRunCoordinator) -> Self {
        Self {
            binder: ScenarioParameterBinder::new(Arc::clone(&catalog)),
            catalog,
            coordinator,
        }
    }

    pub fn catalog(&self) -> &Arc<ScenarioCatalog> {
        &self.catalog
    }

    pub fn start_task_parameters(&self) -> Vec<ParameterSpec> {
        ScenarioParameterBinder::base_parameters()
    }

    pub async fn start_task(&self, ctx: CommandContextRef, params: Map<String, Value>) -> HandlerOutput {
        let request = self.binder.bind(&params).await?;
        self.coordinator.execute(ctx, request).await.map(Some)
    }

    /// Advertise one descriptor-only `start_task:<name>` entry per cached
    /// script.
    pub fn register_script_capabilities(&self, bus: &CommandBus) {
        for (name, script) in self.catalog.cached() {
            let description = script
                .description
                .clone()
                .unwrap_or_else(|| format!("Script task: {}", script.name));
            let meta_script = Arc::clone(&script);
            let descriptor = CommandDescriptor::new(format!("{}{}", TASK_ACTION_PREFIX, name))
                .describe(description)
                .params(ScenarioCatalog::capability_parameters(&name, &script))
                .metadata(move || meta_script.to_json());
            debug!(script = %name, "Registering script capability");
            bus.register_descriptor(descriptor);
        }
    }
}
