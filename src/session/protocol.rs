//! Wire format of the session channel.
//!
//! Every frame is a JSON text envelope `{"type": ..., "data": {...}}`. The
//! structs here are the `data` payloads; [`Envelope`] wraps them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::command::LogLevel;
use crate::device::DeviceInfo;
use crate::AutodriveError;

pub const SESSION_INIT: &str = "session_init";
pub const SESSION_READY: &str = "session_ready";
pub const COMMAND: &str = "command";
pub const COMMAND_ACK: &str = "command_ack";
pub const PROGRESS: &str = "progress";
pub const LOG: &str = "log";
pub const HEARTBEAT: &str = "heartbeat";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const RESULT: &str = "result";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Wrap a serializable payload. Payload types here serialize infallibly
    /// to objects, so a failure degrades to an envelope without data.
    pub fn with_payload<T: Serialize>(kind: &str, payload: &T) -> Self {
        Self::new(kind, serde_json::to_value(payload).ok())
    }

    pub fn pong() -> Self {
        Self::new(PONG, None)
    }

    pub fn to_text(&self) -> Result<String, AutodriveError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(text: &str) -> Result<Self, AutodriveError> {
        Ok(serde_json::from_str(text)?)
    }

    /// `command_id` of a `result` envelope.
    pub fn command_id(&self) -> Option<&str> {
        self.data.as_ref()?.get("command_id")?.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInit {
    pub device_name: String,
    pub device_model: String,
    pub os_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
}

impl SessionInit {
    pub fn new(info: &DeviceInfo, device_id: Option<String>) -> Self {
        Self {
            device_name: info.device_name.clone(),
            device_model: info.device_model.clone(),
            os_version: info.os_version.clone(),
            local_ip: None,
            device_id,
            capabilities: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMessage {
    pub command_id: String,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ResultMessage {
    pub fn success(command_id: impl Into<String>, result: Option<String>) -> Self {
        Self {
            command_id: command_id.into(),
            status: ResultStatus::Success,
            result,
            error_message: None,
            user_id: None,
            device_id: None,
            action: None,
        }
    }

    pub fn failure(command_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            status: ResultStatus::Failed,
            result: None,
            error_message: Some(error_message.into()),
            user_id: None,
            device_id: None,
            action: None,
        }
    }

    /// Attach routing fields. Blank values are dropped.
    pub fn route(
        mut self,
        user_id: Option<&str>,
        device_id: Option<&str>,
        action: Option<&str>,
    ) -> Self {
        let keep = |v: Option<&str>| v.filter(|s| !s.trim().is_empty()).map(str::to_string);
        self.user_id = keep(user_id);
        self.device_id = keep(device_id);
        self.action = keep(action);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// Progress payload. `user_id` and `device_id` are always present on the
/// wire, as `null` when unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressMessage {
    pub command_id: String,
    pub stage: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    pub user_id: Option<String>,
    pub device_id: Option<String>,
}

impl ProgressMessage {
    pub fn new(command_id: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            stage: stage.into(),
            message: message.into(),
            percent: None,
            status: "running",
            extra: None,
            user_id: None,
            device_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogMessage {
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heartbeat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    pub network_type: String,
    pub current_task: String,
}

impl Heartbeat {
    pub fn new(current_task: Option<String>) -> Self {
        Self {
            battery: None,
            network_type: "unknown".to_string(),
            current_task: current_task.unwrap_or_else(|| "idle".to_string()),
        }
    }
}

/// A `command` frame from the server.
///
/// Ids may arrive as numbers and are kept as their string form. A missing
/// action is an empty string so the command is still answered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundCommand {
    #[serde(default, deserialize_with = "lenient_id")]
    pub command_id: Option<String>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: Option<String>,
}

/// Render a scalar as an id string. Null, empty and structured values are no id.
fn scalar_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_id(&value))
}

/// What a received frame means to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ready { device_id: Option<String> },
    Command(InboundCommand),
    Ack(String),
    Ping,
    /// Anything else, including malformed known types. Carries the type.
    Other(String),
}

impl Inbound {
    pub fn from_envelope(envelope: Envelope) -> Self {
        let data = envelope.data.unwrap_or(Value::Null);
        match envelope.kind.as_str() {
            SESSION_READY => Inbound::Ready {
                device_id: data
                    .get("device_id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            },
            COMMAND => {
                let data = if data.is_object() { data } else { Value::Object(Default::default()) };
                Self::command(data)
            }
            COMMAND_ACK => match data.get("command_id").and_then(scalar_id) {
                Some(id) => Inbound::Ack(id),
                None => Inbound::Other(envelope.kind),
            },
            PING => Inbound::Ping,
            _ => Inbound::Other(envelope.kind),
        }
    }

    fn command(data: Value) -> Self {
        match serde_json::from_value::<InboundCommand>(data.clone()) {
                Ok(mut command) => {
                    if command.params.is_null() {
                        command.params = Value::Object(Default::default());
                    }
                    Inbound::Command(command)
                }
            // Only a non-string action can fail here; answer it as unknown.
            Err(e) => {
                warn!(error = %e, "Malformed command frame");
                Inbound::Command(InboundCommand {
                    command_id: data.get("command_id").and_then(scalar_id),
                    action: String::new(),
                    params: Value::Object(Default::default()),
                    user_id: data.get("user_id").and_then(scalar_id),
                })
            }
        }
    }
}
