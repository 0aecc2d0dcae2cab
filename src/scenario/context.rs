use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::reporter::{noop_reporter, ScenarioReporter};
use crate::device::DeviceActions;
use crate::perception::{PerceptionProvider, Snapshot};
use crate::utils::json_path;
use crate::vision::VisionProvider;
use crate::AutodriveError;

/// Per-run state shared between the engine and scene handlers.
pub struct ScenarioContext {
    data: Map<String, Value>,
    snapshot: Arc<Snapshot>,
    current_scene: Option<String>,
    reporter: Arc<dyn ScenarioReporter>,
    perception: Arc<dyn PerceptionProvider>,
    device: Arc<dyn DeviceActions>,
    vision: Arc<dyn VisionProvider>,
    cancel: CancellationToken,
}

impl ScenarioContext {
    pub fn builder(
        perception: Arc<dyn PerceptionProvider>,
        device: Arc<dyn DeviceActions>,
        vision: Arc<dyn VisionProvider>,
    ) -> ScenarioContextBuilder {
        ScenarioContextBuilder {
            data: Map::new(),
            reporter: noop_reporter(),
            perception,
            device,
            vision,
            cancel: CancellationToken::new(),
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }

    /// Copy of the data bag, used to build a resolver for one match pass.
    pub fn data_snapshot(&self) -> Map<String, Value> {
        self.data.clone()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        json_path::get_present(&self.data, path)
    }

    pub fn set(&mut self, path: &str, value: Value) -> bool {
        json_path::set(&mut self.data, path, value)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    pub(crate) fn update_snapshot(&mut self, snapshot: Snapshot) -> Arc<Snapshot> {
        self.snapshot = Arc::new(snapshot);
        Arc::clone(&self.snapshot)
    }

    pub(crate) fn clear_snapshot(&mut self) {
        self.snapshot = Arc::new(Snapshot::empty());
    }

    /// Id of the scene whose handler is running, if any.
    pub fn current_scene(&self) -> Option<&str> {
        self.current_scene.as_deref()
    }

    pub(crate) fn enter_scene(&mut self, id: &str) {
        self.current_scene = Some(id.to_string());
    }

    pub fn reporter(&self) -> &Arc<dyn ScenarioReporter> {
        &self.reporter
    }

    pub fn perception(&self) -> &Arc<dyn PerceptionProvider> {
        &self.perception
    }

    /// Device access. Fails once the run is cancelled so handlers stop
    /// touching the screen.
    pub fn device(&self) -> Result<&dyn DeviceActions, AutodriveError> {
        if self.cancel.is_cancelled() {
            return Err(AutodriveError::Cancelled);
        }
        Ok(self.device.as_ref())
    }

    pub fn vision(&self) -> &Arc<dyn VisionProvider> {
        &self.vision
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct ScenarioContextBuilder {
    data: Map<String, Value>,
    reporter: Arc<dyn ScenarioReporter>,
    perception: Arc<dyn PerceptionProvider>,
    device: Arc<dyn DeviceActions>,
    vision: Arc<dyn VisionProvider>,
    cancel: CancellationToken,
}

impl ScenarioContextBuilder {
    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ScenarioReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> ScenarioContext {
        ScenarioContext {
            data: self.data,
            snapshot: Arc::new(Snapshot::empty()),
            current_scene: None,
            reporter: self.reporter,
            perception: self.perception,
            device: self.device,
            vision: self.vision,
            cancel: self.cancel,
        }
    }
}
