//! Test harness for agent lifecycle management.
//!
//! Provides isolated data directories per test using tempfile, scripted
//! screens for the scenario engine and an in-memory session outbound.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use autodrive::config::AgentConfig;
use autodrive::device::DryRunDevice;
use autodrive::init::AppContext;
use autodrive::perception::{NodeAttributes, PerceptionProvider, Snapshot, UiElement};
use autodrive::scenario::{ScenarioContext, SelectorCondition};
use autodrive::session::{LogMessage, Outbound, ProgressMessage, ResultMessage};
use autodrive::vision::TemplateCache;
use autodrive::AutodriveError;

/// A screen whose root holds one child per label.
pub fn screen(labels: &[&str]) -> Snapshot {
    let children = labels
        .iter()
        .map(|label| UiElement {
            attributes: NodeAttributes {
                text: Some(label.to_string()),
                ..Default::default()
            },
            children: Vec::new(),
        })
        .collect();
    Snapshot::from_root(UiElement {
        attributes: NodeAttributes::default(),
        children,
    })
}

/// Exact-text selector.
pub fn text(label: &str) -> SelectorCondition {
    SelectorCondition::builder()
        .text(label)
        .build()
        .expect("text selector")
}

/// Replays snapshots in order, then keeps returning the last one.
pub struct ScriptedPerception {
    frames: Mutex<VecDeque<Snapshot>>,
    last: Mutex<Snapshot>,
    captures: Mutex<usize>,
}

impl ScriptedPerception {
    pub fn new(frames: Vec<Snapshot>) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(frames.into()),
            last: Mutex::new(Snapshot::empty()),
            captures: Mutex::new(0),
        })
    }

    pub fn captures(&self) -> usize {
        *self.captures.lock().unwrap()
    }
}

#[async_trait]
impl PerceptionProvider for ScriptedPerception {
    async fn capture(&self) -> Result<Snapshot, AutodriveError> {
        *self.captures.lock().unwrap() += 1;
        let next = self.frames.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(frame) = next {
            *last = frame;
        }
        Ok(last.clone())
    }
}

/// Scenario context over `perception` with a dry-run device.
pub fn scenario_context(perception: Arc<dyn PerceptionProvider>) -> (ScenarioContext, Arc<DryRunDevice>) {
    let device = Arc::new(DryRunDevice::new());
    let ctx = ScenarioContext::builder(perception, device.clone(), Arc::new(TemplateCache::new())).build();
    (ctx, device)
}

/// One message as it would have left the session.
#[derive(Debug, Clone)]
pub enum Sent {
    Result(ResultMessage),
    Progress(ProgressMessage),
    Log(LogMessage),
}

/// Outbound that records everything instead of writing to a socket.
pub struct RecordingOutbound {
    device_id: Option<String>,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingOutbound {
    pub fn new(device_id: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            device_id: device_id.map(str::to_string),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn results(&self) -> Vec<ResultMessage> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Sent::Result(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn result_for(&self, command_id: &str) -> Option<ResultMessage> {
        self.results().into_iter().find(|r| r.command_id == command_id)
    }

    /// Progress stages reported for `command_id`, in order.
    pub fn stages_for(&self, command_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Sent::Progress(p) if p.command_id == command_id => Some(p.stage),
                _ => None,
            })
            .collect()
    }
}

impl Outbound for RecordingOutbound {
    fn send_result(&self, result: ResultMessage) {
        self.sent.lock().unwrap().push(Sent::Result(result));
    }

    fn send_progress(&self, progress: ProgressMessage) {
        self.sent.lock().unwrap().push(Sent::Progress(progress));
    }

    fn send_log(&self, log: LogMessage) {
        self.sent.lock().unwrap().push(Sent::Log(log));
    }

    fn device_id(&self) -> Option<String> {
        self.device_id.clone()
    }
}

/// Poll `condition` every few milliseconds; panics after five seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), poll).await.is_err() {
        panic!("timed out waiting for {}", what);
    }
}

/// Agent context over an isolated data directory.
///
/// Screens are served from `screen.json` in the data directory; scripts live
/// under `scripts/`. The directory is removed when the harness is dropped.
pub struct TestApp {
    pub app: AppContext,
    pub temp_dir: TempDir,
}

impl TestApp {
    /// Create a context with the given scripts installed before startup.
    ///
    /// Each script is `(name, project.yaml, scenes.yaml)`.
    pub async fn with_scripts(scripts: &[(&str, &str, &str)]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory for test data");
        for (name, project, scenes) in scripts {
            write_script(&temp_dir.path().join("scripts"), name, project, scenes);
        }
        let config = AgentConfig {
            snapshot_path: Some(temp_dir.path().join("screen.json")),
            poll_interval_ms: 10,
            no_match_timeout_ms: 2_000,
            ..Default::default()
        };
        let app = AppContext::with_config(temp_dir.path().to_path_buf(), config)
            .await
            .expect("Failed to initialize test context");
        Self { app, temp_dir }
    }

    pub async fn new() -> Self {
        Self::with_scripts(&[]).await
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Replace the screen the perception backend reads.
    pub fn show(&self, labels: &[&str]) {
        let tree = screen(labels).to_tree().expect("non-empty screen");
        let body = serde_json::to_string(&tree).expect("serialize screen");
        std::fs::write(self.temp_path().join("screen.json"), body).expect("write screen");
    }
}

/// Write `<root>/<name>/{project,scenes}.yaml`.
pub fn write_script(root: &Path, name: &str, project: &str, scenes: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).expect("create script dir");
    std::fs::write(dir.join("project.yaml"), project).expect("write project.yaml");
    std::fs::write(dir.join("scenes.yaml"), scenes).expect("write scenes.yaml");
    dir
}
