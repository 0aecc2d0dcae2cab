use crate::error::AutodriveError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Device identity and connection history that persist across restarts.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeviceState {
    /// Server-assigned device id (from `session_ready`)
    pub device_id: Option<String>,
    /// When the transport last opened
    pub last_connected: Option<DateTime<Utc>>,
    /// When the server last completed the handshake
    pub last_session_ready: Option<DateTime<Utc>>,
}

/// Manages device state persistence to disk.
#[derive(Clone)]
pub struct DeviceStateStore {
    /// Path to the device state JSON file
    state_path: PathBuf,
    /// Current device state
    state: Arc<RwLock<DeviceState>>,
}

impl DeviceStateStore {
    /// Load device state from disk or start from a default state.
    pub fn load_or_create(path: &Path) -> Result<Self, AutodriveError> {
        let state = if path.exists() {
            let json = std::fs::read_to_string(path).map_err(|e| {
                AutodriveError::Config(format!("Failed to read device state: {}", e))
            })?;

            serde_json::from_str(&json).map_err(|e| {
                AutodriveError::Config(format!("Failed to parse device state: {}", e))
            })?
        } else {
            DeviceState::default()
        };

        Ok(Self {
            state_path: path.to_path_buf(),
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Persist current state to disk.
    pub async fn save(&self) -> Result<(), AutodriveError> {
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state).map_err(|e| {
                AutodriveError::Config(format!("Failed to serialize device state: {}", e))
            })?
        };

        if let Some(parent) = self.state_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AutodriveError::Config(format!("Failed to create state directory: {}", e))
            })?;
        }

        tokio::fs::write(&self.state_path, json)
            .await
            .map_err(|e| AutodriveError::Config(format!("Failed to write device state: {}", e)))?;

        Ok(())
    }

    pub async fn device_id(&self) -> Option<String> {
        self.state.read().await.device_id.clone()
    }

    /// Adopt a server-assigned id. Returns true when it changed.
    pub async fn set_device_id(&self, device_id: &str) -> bool {
        let mut state = self.state.write().await;
        state.last_session_ready = Some(Utc::now());
        if state.device_id.as_deref() == Some(device_id) {
            return false;
        }
        state.device_id = Some(device_id.to_string());
        true
    }

    pub async fn mark_connected(&self) {
        let mut state = self.state.write().await;
        state.last_connected = Some(Utc::now());
    }

    pub async fn snapshot(&self) -> DeviceState {
        self.state.read().await.clone()
    }

    pub fn path(&self) -> &Path {
        &self.state_path
    }
}
