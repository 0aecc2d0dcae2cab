use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::command::{CommandContext, LogLevel};
use crate::session::{LogMessage, Outbound, ProgressMessage, ResultMessage};

/// A command accepted by the coordinator. Doubles as the handler's context:
/// progress and logs go straight to the session.
pub struct RunningCommand {
    command_id: String,
    action: String,
    user_id: Option<String>,
    params: Value,
    cancel: CancellationToken,
    completed: AtomicBool,
    outbound: Arc<dyn Outbound>,
}

impl RunningCommand {
    pub fn new(
        command_id: impl Into<String>,
        action: impl Into<String>,
        user_id: Option<String>,
        params: Value,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            action: action.into(),
            user_id,
            params,
            cancel: CancellationToken::new(),
            completed: AtomicBool::new(false),
            outbound,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    /// Request cancellation. False if it was already requested.
    pub fn cancel(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send this command's result, routed with its user and device.
    pub fn send_result(&self, result: ResultMessage) {
        let device_id = self.outbound.device_id();
        self.outbound.send_result(result.route(
            self.user_id.as_deref(),
            device_id.as_deref(),
            Some(&self.action),
        ));
    }
}

impl CommandContext for RunningCommand {
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
        self.outbound.device_id()
    }

    fn raw_params(&self) -> &Value {
        &self.params
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn report_progress(&self, stage: &str, message: &str, percent: Option<u8>, extra: Option<Value>) {
        let mut progress = ProgressMessage::new(&self.command_id, stage, message);
        progress.percent = percent;
        progress.extra = extra;
        progress.user_id = self.user_id.clone();
        progress.device_id = self.outbound.device_id();
        self.outbound.send_progress(progress);
    }

    fn report_log(&self, level: LogLevel, message: &str, extra: Option<Value>) {
        self.outbound.send_log(LogMessage {
            level,
            message: message.to_string(),
            extra,
            user_id: self.user_id.clone(),
            device_id: self.outbound.device_id(),
        });
    }
}
