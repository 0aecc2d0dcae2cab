use std::sync::Arc;

use crate::command::{CommandBus, CommandDescriptor, CommandModule};
use crate::executor::STOP_TASK_ACTION;
use crate::task::ScenarioTaskService;

/// `start_task` plus one capability entry per known script.
pub struct ScenarioCommandModule {
    service: Arc<ScenarioTaskService>,
}

impl ScenarioCommandModule {
    pub fn new(service: Arc<ScenarioTaskService>) -> Self {
        Self { service }
    }
}

impl CommandModule for ScenarioCommandModule {
    fn name(&self) -> &'static str {
        "scenario"
    }

    fn register(&self, bus: &CommandBus) {
        let catalog = Arc::clone(self.service.catalog());
        let service = Arc::clone(&self.service);
        bus.register_fn(
            CommandDescriptor::new("start_task")
                .describe("Run a script task")
                .params(self.service.start_task_parameters())
                .metadata(move || catalog.catalog_metadata()),
            move |ctx, params| {
                let service = Arc::clone(&service);
                async move { service.start_task(ctx, params).await }
            },
        );
        // Handled by the execution coordinator before dispatch.
        bus.register_descriptor(
            CommandDescriptor::new(STOP_TASK_ACTION).describe("Cancel the running task"),
        );
        self.service.register_script_capabilities(bus);
    }
}
