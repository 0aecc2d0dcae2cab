//! Agent configuration.
//!
//! Loaded from `{data_path}/agent.toml`, then environment variables for
//! fields the file leaves unset, then defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceInfo;
use crate::session::{SessionSettings, DEFAULT_MAX_PENDING_MESSAGES};
use crate::AutodriveError;

pub const CONFIG_FILE: &str = "agent.toml";
pub const ENV_SERVER_URL: &str = "AUTODRIVE_SERVER_URL";
pub const ENV_DEVICE_NAME: &str = "AUTODRIVE_DEVICE_NAME";

const DEFAULT_DEVICE_NAME: &str = "autodrive-agent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Websocket endpoint of the control server (e.g. `ws://10.0.0.2:8080/ws`)
    pub server_url: Option<String>,
    pub device_name: Option<String>,
    pub device_model: Option<String>,
    /// Script directory (default: `{data_path}/scripts`)
    pub scripts_dir: Option<PathBuf>,
    pub heartbeat_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_pending_messages: usize,
    pub poll_interval_ms: u64,
    pub no_match_timeout_ms: u64,
    /// Hierarchy dump file read on every capture. Unset means a static,
    /// empty screen.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            device_name: None,
            device_model: None,
            scripts_dir: None,
            heartbeat_secs: 30,
            reconnect_delay_secs: 5,
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
            poll_interval_ms: 400,
            no_match_timeout_ms: 30_000,
            snapshot_path: None,
        }
    }
}

impl AgentConfig {
    /// Load config with priority:
    /// 1. `{data_path}/agent.toml`
    /// 2. `AUTODRIVE_SERVER_URL` / `AUTODRIVE_DEVICE_NAME`
    /// 3. Defaults
    ///
    /// An unreadable or malformed file is logged and ignored.
    pub fn load(data_path: &Path) -> Self {
        let mut config = Self::load_file(&data_path.join(CONFIG_FILE)).unwrap_or_default();
        config.fill_from_env(|key| std::env::var(key).ok());
        config
    }

    fn load_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded agent config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                None
            }
        }
    }

    /// Fill unset fields from the environment.
    pub fn fill_from_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if self.server_url.is_none() {
            self.server_url = non_empty(ENV_SERVER_URL);
        }
        if self.device_name.is_none() {
            self.device_name = non_empty(ENV_DEVICE_NAME);
        }
    }

    pub fn validate(&self) -> Result<(), AutodriveError> {
        if self.max_pending_messages == 0 {
            return Err(AutodriveError::Config(
                "max_pending_messages must be at least 1".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(AutodriveError::Config("poll_interval_ms must be positive".into()));
        }
        if self.heartbeat_secs == 0 {
            return Err(AutodriveError::Config("heartbeat_secs must be positive".into()));
        }
        if let Some(url) = &self.server_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(AutodriveError::Config(format!(
                    "server_url must be a ws:// or wss:// url, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }

    pub fn scripts_dir(&self, data_path: &Path) -> PathBuf {
        self.scripts_dir
            .clone()
            .unwrap_or_else(|| data_path.join("scripts"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn no_match_timeout(&self) -> Duration {
        Duration::from_millis(self.no_match_timeout_ms)
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::new(
            self.device_name.as_deref().unwrap_or(DEFAULT_DEVICE_NAME),
            self.device_model
                .as_deref()
                .unwrap_or(std::env::consts::ARCH),
        )
    }

    /// Session settings for `url`, or the configured server url.
    pub fn session_settings(&self, url: Option<&str>) -> Result<SessionSettings, AutodriveError> {
        let url = url
            .map(str::to_string)
            .or_else(|| self.server_url.clone())
            .ok_or_else(|| {
                AutodriveError::Config(format!(
                    "no server url: pass --url, set {} or server_url in {}",
                    ENV_SERVER_URL, CONFIG_FILE
                ))
            })?;
        let mut settings = SessionSettings::new(url);
        settings.heartbeat_interval = Duration::from_secs(self.heartbeat_secs);
        settings.reconnect_delay = Duration::from_secs(self.reconnect_delay_secs);
        settings.max_pending_messages = self.max_pending_messages;
        Ok(settings)
    }
}
