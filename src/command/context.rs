//! Per-invocation context handed to handlers and interceptors.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a command invocation plus its reporting channel.
///
/// Reporting is fire-and-forget: implementations queue or log, never fail.
pub trait CommandContext: Send + Sync {
    fn command_id(&self) -> &str;

    fn action(&self) -> &str;

    fn user_id(&self) -> Option<&str>;

    fn device_id(&self) -> Option<String>;

    /// Params exactly as received, before normalization.
    fn raw_params(&self) -> &Value;

    fn cancellation(&self) -> &CancellationToken;

    fn report_progress(&self, stage: &str, message: &str, percent: Option<u8>, extra: Option<Value>);

    fn report_log(&self, level: LogLevel, message: &str, extra: Option<Value>);
}

pub type CommandContextRef = Arc<dyn CommandContext>;

/// One reported event, as captured by [`LocalContext`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportedEvent {
    Progress {
        stage: String,
        message: String,
        percent: Option<u8>,
        extra: Option<Value>,
    },
    Log {
        level: LogLevel,
        message: String,
        extra: Option<Value>,
    },
}

/// Context for commands run in-process (CLI, tests): reports go to tracing
/// and are kept for inspection.
pub struct LocalContext {
    command_id: String,
    action: String,
    user_id: Option<String>,
    device_id: Option<String>,
    params: Value,
    cancel: CancellationToken,
    events: Mutex<Vec<ReportedEvent>>,
}

impl LocalContext {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            command_id: uuid::Uuid::new_v4().to_string(),
            action: action.into(),
            user_id: None,
            device_id: None,
            params,
            cancel: CancellationToken::new(),
            events: Mutex::default(),
        }
    }

    pub fn with_ids(mut self, command_id: impl Into<String>, user_id: Option<String>) -> Self {
        self.command_id = command_id.into();
        self.user_id = user_id;
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn events(&self) -> Vec<ReportedEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Stages of every progress event, in order.
    pub fn stages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportedEvent::Progress { stage, .. } => Some(stage),
                ReportedEvent::Log { .. } => None,
            })
            .collect()
    }

    fn push(&self, event: ReportedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl CommandContext for LocalContext {
    fn command_id(&self) -> &str {
        &self.command_id
    }

    fn action(&self) -> &str {
        &self.action
    }

    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn device_id(&self) -> Option<String> {
        self.device_id.clone()
    }

    fn raw_params(&self) -> &Value {
        &self.params
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn report_progress(&self, stage: &str, message: &str, percent: Option<u8>, extra: Option<Value>) {
        info!(command_id = %self.command_id, stage, percent, "{}", message);
        self.push(ReportedEvent::Progress {
            stage: stage.to_string(),
            message: message.to_string(),
            percent,
            extra,
        });
    }

    fn report_log(&self, level: LogLevel, message: &str, extra: Option<Value>) {
        match level {
            LogLevel::Error => error!(command_id = %self.command_id, "{}", message),
            LogLevel::Warning => warn!(command_id = %self.command_id, "{}", message),
            _ => info!(command_id = %self.command_id, "{}", message),
        }
        self.push(ReportedEvent::Log {
            level,
            message: message.to_string(),
            extra,
        });
    }
}
