use serde::Serialize;
use serde_json::Value;

/// Outcome of a handled command. A failure here is a normal answer, not a
/// pipeline error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(payload: impl Into<Value>) -> Self {
        Self {
            success: true,
            payload: Some(payload.into()),
            message: None,
        }
    }

    pub fn success_with_message(payload: impl Into<Value>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: Some(payload.into()),
            message: Some(message.into()),
        }
    }

    pub fn success_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: None,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            message: Some(message.into()),
        }
    }

    pub fn failure_with_payload(message: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            success: false,
            payload: Some(payload.into()),
            message: Some(message.into()),
        }
    }

    /// Wire form of the payload: strings verbatim, other JSON serialized,
    /// falling back to the message.
    pub fn render_payload(&self) -> Option<String> {
        match &self.payload {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => self.message.clone(),
            Some(other) => Some(other.to_string()),
        }
    }

    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(fallback)
    }
}
