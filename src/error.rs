use thiserror::Error;

/// Error type shared by the dispatch pipeline, scenario engine and session client.
#[derive(Debug, Error)]
pub enum AutodriveError {
    /// No descriptor is registered under the requested action.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The action is advertised but nothing handles it.
    #[error("action '{0}' has no handler")]
    NoHandler(String),

    /// A parameter is missing, blank, or outside its allowed values.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A parameter value could not be converted to its declared type.
    #[error("parameter '{name}' is not a valid {expected}")]
    TypeMismatch { name: String, expected: String },

    /// The handler chain finished without producing a result.
    #[error("command produced no result")]
    NoResult,

    /// An interceptor returned without proceeding or short-circuiting with an error.
    #[error("interceptor '{0}' returned without calling proceed")]
    InterceptorContract(String),

    #[error("device busy")]
    DeviceBusy,

    #[error("executor rejected command")]
    ExecutorRejected,

    #[error("command cancelled")]
    Cancelled,

    /// More than one scene matched the same snapshot.
    #[error("scene conflict: {}", .0.join(", "))]
    SceneConflict(Vec<String>),

    /// No scene matched within the no-match window.
    #[error("no scene matched within {0} ms")]
    Timeout(u64),

    #[error("script has no scenes")]
    EmptyScript,

    /// Script files are missing or malformed.
    #[error("script error: {0}")]
    Script(String),

    /// A scene names a handler that no provider supplies for the script.
    #[error("script '{script}' references unknown handler '{handler}'")]
    UnknownHandler { script: String, handler: String },

    #[error("selector error: {0}")]
    Selector(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("vision error: {0}")]
    Vision(String),

    #[error("perception error: {0}")]
    Perception(String),

    /// Socket-level failure; the session client retries these.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AutodriveError {
    /// Stable machine-readable code, sent in progress extras.
    pub fn error_code(&self) -> &'static str {
        match self {
            AutodriveError::UnknownAction(_) => "UNKNOWN_ACTION",
            AutodriveError::NoHandler(_) => "NO_HANDLER",
            AutodriveError::InvalidParameter { .. } => "INVALID_PARAMETER",
            AutodriveError::TypeMismatch { .. } => "TYPE_MISMATCH",
            AutodriveError::NoResult => "NO_RESULT",
            AutodriveError::InterceptorContract(_) => "INTERCEPTOR_CONTRACT",
            AutodriveError::DeviceBusy => "DEVICE_BUSY",
            AutodriveError::ExecutorRejected => "EXECUTOR_REJECTED",
            AutodriveError::Cancelled => "CANCELLED",
            AutodriveError::SceneConflict(_) => "SCENE_CONFLICT",
            AutodriveError::Timeout(_) => "TIMEOUT",
            AutodriveError::EmptyScript => "EMPTY_SCRIPT",
            AutodriveError::Script(_) => "SCRIPT_ERROR",
            AutodriveError::UnknownHandler { .. } => "UNKNOWN_HANDLER",
            AutodriveError::Selector(_) => "SELECTOR_ERROR",
            AutodriveError::Device(_) => "DEVICE_ERROR",
            AutodriveError::Vision(_) => "VISION_ERROR",
            AutodriveError::Perception(_) => "PERCEPTION_ERROR",
            AutodriveError::Transport(_) => "TRANSPORT_ERROR",
            AutodriveError::Config(_) => "CONFIG_ERROR",
            AutodriveError::Io(_) => "IO_ERROR",
            AutodriveError::Json(_) => "JSON_ERROR",
        }
    }

    /// Errors caused by the request itself. Retrying the same input never helps.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AutodriveError::UnknownAction(_)
                | AutodriveError::NoHandler(_)
                | AutodriveError::InvalidParameter { .. }
                | AutodriveError::TypeMismatch { .. }
        )
    }

    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AutodriveError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(name: impl Into<String>, expected: impl Into<String>) -> Self {
        AutodriveError::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
        }
    }
}

impl From<serde_yaml_ng::Error> for AutodriveError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        AutodriveError::Script(format!("YAML error: {}", err))
    }
}

impl From<regex::Error> for AutodriveError {
    fn from(err: regex::Error) -> Self {
        AutodriveError::Selector(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AutodriveError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AutodriveError::Transport(err.to_string())
    }
}
