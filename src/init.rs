//! Shared initialization logic for the agent and CLI commands.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::modules::{
    DeviceInteractionModule, DiagnosticsCommandModule, ScenarioCommandModule, VisionCommandModule,
};
use crate::command::{CommandBus, CommandModule, LoggingInterceptor};
use crate::config::AgentConfig;
use crate::device::{DeviceActions, DeviceInfo, DryRunDevice};
use crate::executor::ExecutionCoordinator;
use crate::perception::{JsonFilePerception, PerceptionProvider, StaticPerception};
use crate::scenario::ScenarioRunner;
use crate::script::{DirScriptRepository, HandlerRegistry, ScriptRepository};
use crate::session::{DeviceStateStore, DnsProbe, SessionClient, SessionHandle};
use crate::task::{ScenarioCatalog, ScenarioProviders, ScenarioRunCoordinator, ScenarioTaskService};
use crate::vision::{TemplateCache, VisionProvider};

/// Application context holding the command bus and everything behind it.
///
/// Shared between the agent (`run`) and one-shot CLI commands.
pub struct AppContext {
    pub data_path: PathBuf,
    pub config: AgentConfig,
    pub info: DeviceInfo,
    pub device_state: DeviceStateStore,
    pub providers: ScenarioProviders,
    pub catalog: Arc<ScenarioCatalog>,
    pub handlers: HandlerRegistry,
    pub bus: Arc<CommandBus>,
}

/// A wired session: the socket driver plus the executor it feeds.
pub struct Agent {
    pub client: SessionClient,
    pub executor: Arc<ExecutionCoordinator>,
}

impl AppContext {
    /// Initialize application context.
    ///
    /// Data path priority: explicit path > AUTODRIVE_DATA_PATH env > ./.autodrive (if exists) > ~/.autodrive
    pub async fn new(explicit_path: Option<PathBuf>) -> Result<Self> {
        let data_path = resolve_data_path(explicit_path);
        tracing::info!("Using data path: {}", data_path.display());

        let config = AgentConfig::load(&data_path);
        Self::with_config(data_path, config).await
    }

    /// Build a context from an explicit config, skipping file and env lookup.
    pub async fn with_config(data_path: PathBuf, config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let device_state = DeviceStateStore::load_or_create(&data_path.join("device.json"))?;
        tracing::info!("Device state loaded");

        let perception: Arc<dyn PerceptionProvider> = match &config.snapshot_path {
            Some(path) => Arc::new(JsonFilePerception::new(path.clone())),
            None => Arc::new(StaticPerception::default()),
        };
        let device: Arc<dyn DeviceActions> = Arc::new(DryRunDevice::new());
        let vision: Arc<dyn VisionProvider> = Arc::new(TemplateCache::new());
        let providers = ScenarioProviders {
            perception,
            device,
            vision,
        };

        // Scripts
        let scripts_dir = config.scripts_dir(&data_path);
        let repository: Arc<dyn ScriptRepository> = Arc::new(DirScriptRepository::new(scripts_dir.clone()));
        let catalog = Arc::new(ScenarioCatalog::new(repository));
        let loaded = catalog.refresh().await;
        tracing::info!("Loaded {} scripts from {}", loaded, scripts_dir.display());

        let handlers = HandlerRegistry::with_builtins();
        let coordinator = ScenarioRunCoordinator::new(
            Arc::new(ScenarioRunner::default()),
            handlers.clone(),
            providers.clone(),
        )
        .with_timing(config.poll_interval(), config.no_match_timeout());
        let task_service = Arc::new(ScenarioTaskService::new(Arc::clone(&catalog), coordinator));

        // Commands
        let info = config.device_info();
        let bus = Arc::new(CommandBus::new());
        bus.add_interceptor(Arc::new(LoggingInterceptor));
        let modules: Vec<Box<dyn CommandModule>> = vec![
            Box::new(DeviceInteractionModule::new(Arc::clone(&providers.device))),
            Box::new(VisionCommandModule::new(Arc::clone(&providers.vision))),
            Box::new(DiagnosticsCommandModule::new(
                Arc::clone(&providers.perception),
                info.clone(),
                &bus,
            )),
            Box::new(ScenarioCommandModule::new(task_service)),
        ];
        for module in &modules {
            module.register(&bus);
            tracing::debug!(module = module.name(), "Command module registered");
        }
        tracing::info!("{} actions registered", bus.len());

        Ok(Self {
            data_path,
            config,
            info,
            device_state,
            providers,
            catalog,
            handlers,
            bus,
        })
    }

    /// Wire a session to `url` (or the configured server) and start the
    /// executor. The session is not connected until `client.run()`.
    pub async fn agent(&self, url: Option<&str>) -> Result<Agent> {
        let settings = self.config.session_settings(url)?;
        let probe = DnsProbe::for_url(&settings.url)?;
        let device_id = self.device_state.device_id().await;
        let handle = SessionHandle::new(self.info.clone(), device_id, settings.max_pending_messages);

        let executor = ExecutionCoordinator::start(Arc::clone(&self.bus), Arc::new(handle.clone()));
        let bus = Arc::clone(&self.bus);
        let status = Arc::clone(&executor);
        let client = SessionClient::new(settings, handle, executor.clone())
            .with_probe(Arc::new(probe))
            .with_state_store(self.device_state.clone())
            .with_capabilities(move || bus.capabilities())
            .with_task_status(move || status.current_task());

        Ok(Agent { client, executor })
    }
}

fn resolve_data_path(explicit_path: Option<PathBuf>) -> PathBuf {
    explicit_path
        .or_else(|| std::env::var("AUTODRIVE_DATA_PATH").ok().map(PathBuf::from))
        .or_else(|| {
            let local_path = Path::new(".autodrive");
            if local_path.exists() && local_path.is_dir() {
                Some(local_path.to_path_buf())
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".autodrive"))
                .unwrap_or_else(|| PathBuf::from(".autodrive"))
        })
}
