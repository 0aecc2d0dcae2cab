//! Device input primitives.
//!
//! Real backends (instrumentation bridge, adb, HID gadget) implement
//! [`DeviceActions`]; the agent ships a dry-run implementation that records
//! and logs what it would have done.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::AutodriveError;

pub const KEYCODE_HOME: i32 = 3;
pub const KEYCODE_BACK: i32 = 4;

#[async_trait]
pub trait DeviceActions: Send + Sync {
    async fn click(&self, x: i32, y: i32) -> Result<(), AutodriveError>;

    async fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> Result<(), AutodriveError>;

    async fn swipe(
        &self,
        start: (i32, i32),
        end: (i32, i32),
        steps: u32,
    ) -> Result<(), AutodriveError>;

    async fn input_text(&self, text: &str) -> Result<(), AutodriveError>;

    async fn press_key(&self, keycode: i32) -> Result<(), AutodriveError>;

    async fn press_back(&self) -> Result<(), AutodriveError> {
        self.press_key(KEYCODE_BACK).await
    }

    async fn press_home(&self) -> Result<(), AutodriveError> {
        self.press_key(KEYCODE_HOME).await
    }
}

/// Static identity advertised in `session_init` and `device_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub device_name: String,
    pub device_model: String,
    pub os_version: String,
}

impl DeviceInfo {
    pub fn new(device_name: impl Into<String>, device_model: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            device_model: device_model.into(),
            os_version: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

/// One primitive as issued to a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceAction {
    Click { x: i32, y: i32 },
    LongPress { x: i32, y: i32, duration_ms: u64 },
    Swipe { start: (i32, i32), end: (i32, i32), steps: u32 },
    InputText { text: String },
    PressKey { keycode: i32 },
}

/// Logs and records every action without touching hardware.
#[derive(Default)]
pub struct DryRunDevice {
    history: Mutex<Vec<DeviceAction>>,
}

impl DryRunDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<DeviceAction> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn record(&self, action: DeviceAction) {
        info!(?action, "Device action (dry run)");
        if let Ok(mut history) = self.history.lock() {
            history.push(action);
        }
    }
}

#[async_trait]
impl DeviceActions for DryRunDevice {
    async fn click(&self, x: i32, y: i32) -> Result<(), AutodriveError> {
        self.record(DeviceAction::Click { x, y });
        Ok(())
    }

    async fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> Result<(), AutodriveError> {
        self.record(DeviceAction::LongPress { x, y, duration_ms });
        Ok(())
    }

    async fn swipe(
        &self,
        start: (i32, i32),
        end: (i32, i32),
        steps: u32,
    ) -> Result<(), AutodriveError> {
        self.record(DeviceAction::Swipe { start, end, steps });
        Ok(())
    }

    async fn input_text(&self, text: &str) -> Result<(), AutodriveError> {
        self.record(DeviceAction::InputText {
            text: text.to_string(),
        });
        Ok(())
    }

    async fn press_key(&self, keycode: i32) -> Result<(), AutodriveError> {
        self.record(DeviceAction::PressKey { keycode });
        Ok(())
    }
}
