//! Single-flight command execution.
//!
//! Commands arrive from the session one at a time and must not block it:
//! acceptance is synchronous, execution happens on one worker task that
//! runs jobs strictly in order. At most one command is in flight
//! device-wide.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::running::RunningCommand;
use super::slot::CurrentCommandSlot;
use crate::command::{CommandBus, CommandContext, CommandContextRef};
use crate::error::AutodriveError;
use crate::guard::RunGuard;
use crate::session::{CommandListener, InboundCommand, Outbound, ResultMessage};

pub const STOP_TASK_ACTION: &str = "stop_task";

const JOB_QUEUE_CAPACITY: usize = 8;

struct Job {
    command: Arc<RunningCommand>,
    generation: u64,
}

/// State the worker shares with the coordinator.
struct Worker {
    bus: Arc<CommandBus>,
    guard: Arc<RunGuard>,
    slot: Arc<CurrentCommandSlot>,
}

pub struct ExecutionCoordinator {
    outbound: Arc<dyn Outbound>,
    guard: Arc<RunGuard>,
    slot: Arc<CurrentCommandSlot>,
    running: AtomicBool,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionCoordinator {
    /// Spawn the worker and start accepting commands. Must be called inside
    /// a tokio runtime.
    pub fn start(bus: Arc<CommandBus>, outbound: Arc<dyn Outbound>) -> Arc<Self> {
        let guard = Arc::new(RunGuard::new());
        let slot = Arc::new(CurrentCommandSlot::new());
        let (tx, rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let worker = Worker {
            bus,
            guard: Arc::clone(&guard),
            slot: Arc::clone(&slot),
        };
        let handle = tokio::spawn(worker.run(rx));
        info!("Execution coordinator started");
        Arc::new(Self {
            outbound,
            guard,
            slot,
            running: AtomicBool::new(true),
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Action of the command in flight, for heartbeats.
    pub fn current_task(&self) -> Option<String> {
        self.slot
            .peek()
            .filter(|c| !c.is_completed())
            .map(|c| c.action().to_string())
    }

    /// Stop accepting commands and cancel the one in flight. The worker
    /// exits once its current job returns.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(active) = self.slot.peek() {
            if !active.is_completed() {
                active.cancel();
            }
        }
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).take();
        info!("Execution coordinator stopped");
    }

    /// Wait for the worker to finish after [`stop`](Self::stop).
    pub async fn join(&self) {
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Command worker panicked");
            }
        }
    }

    /// Accept or reject a command. Always answers, never blocks.
    #[instrument(skip_all, fields(action = %command.action))]
    pub fn accept(&self, command: InboundCommand) {
        let command_id = command
            .command_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let user_id = command.user_id;
        let action = command.action;
        info!(command_id = %command_id, "Command received");

        if action == STOP_TASK_ACTION {
            self.stop_current(&command_id, user_id.as_deref());
            return;
        }

        if !self.is_running() {
            self.reject(&command_id, user_id.as_deref(), &action, "controller not running");
            return;
        }

        if let Some(active) = self.slot.peek() {
            if !active.is_completed() {
                warn!(busy_with = active.command_id(), "Device busy, rejecting command");
                self.reject(&command_id, user_id.as_deref(), &action, &AutodriveError::DeviceBusy.to_string());
                return;
            }
        }

        if !self.guard.try_acquire(&command_id) {
            warn!(holder = ?self.guard.current(), "Run guard held, rejecting command");
            self.reject(&command_id, user_id.as_deref(), &action, &AutodriveError::DeviceBusy.to_string());
            return;
        }

        let running = Arc::new(RunningCommand::new(
            command_id.clone(),
            action.clone(),
            user_id.clone(),
            command.params,
            Arc::clone(&self.outbound),
        ));
        let generation = self.slot.install(Arc::clone(&running));
        let job = Job {
            command: running,
            generation,
        };

        let submitted = {
            let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            match jobs.as_ref() {
                Some(tx) => tx.try_send(job).is_ok(),
                None => false,
            }
        };
        if !submitted {
            error!(command_id = %command_id, "Worker rejected command");
            self.guard.release(&command_id);
            self.slot.clear_if(&command_id, generation);
            self.reject(
                &command_id,
                user_id.as_deref(),
                &action,
                &AutodriveError::ExecutorRejected.to_string(),
            );
        }
    }

    fn stop_current(&self, command_id: &str, user_id: Option<&str>) {
        let device_id = self.outbound.device_id();
        let route = |r: ResultMessage| {
            r.route(user_id, device_id.as_deref(), Some(STOP_TASK_ACTION))
        };
        let active = self.slot.peek().filter(|c| !c.is_completed());
        let result = match active {
            None => {
                warn!("Stop requested with no running task");
                ResultMessage::failure(command_id, "no running task")
            }
            Some(active) if active.cancel() => {
                info!(target_command = active.command_id(), "Cancel requested");
                ResultMessage::success(command_id, Some("cancel requested".to_string()))
            }
            Some(_) => ResultMessage::failure(command_id, "unable to cancel"),
        };
        self.outbound.send_result(route(result));
    }

    fn reject(&self, command_id: &str, user_id: Option<&str>, action: &str, reason: &str) {
        let device_id = self.outbound.device_id();
        self.outbound.send_result(
            ResultMessage::failure(command_id, reason).route(user_id, device_id.as_deref(), Some(action)),
        );
    }
}

impl CommandListener for ExecutionCoordinator {
    fn on_command(&self, command: InboundCommand) {
        self.accept(command);
    }
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Job>) {
        while let Some(job) = rx.recv().await {
            self.execute(job).await;
        }
        debug!("Command worker exiting");
    }

    #[instrument(skip_all, fields(command_id = job.command.command_id(), action = job.command.action()))]
    async fn execute(&self, job: Job) {
        let command = job.command;
        command.report_progress("start", "executing command", Some(0), None);

        let ctx: CommandContextRef = command.clone();
        let outcome = self
            .bus
            .dispatch(ctx, command.action(), command.raw_params())
            .await;

        match outcome {
            Ok(result) if result.success => {
                let rendered = result.render_payload();
                info!("Command succeeded");
                command.send_result(ResultMessage::success(command.command_id(), rendered));
                command.report_progress(
                    "finish",
                    result.message_or("command finished"),
                    Some(100),
                    object_extra(result.payload.as_ref()),
                );
            }
            _ if command.is_cancelled() => {
                warn!("Command interrupted");
                command.report_progress("error", "command interrupted", None, None);
                command.send_result(ResultMessage::failure(command.command_id(), AutodriveError::Cancelled.to_string()));
            }
            Ok(result) => {
                let message = result.message_or("command failed");
                warn!(message, "Command failed");
                command.report_progress("error", message, None, object_extra(result.payload.as_ref()));
                let mut failure = ResultMessage::failure(command.command_id(), message);
                failure.result = result.render_payload();
                command.send_result(failure);
            }
            Err(e) => {
                error!(error = %e, "Command errored");
                command.report_progress(
                    "error",
                    "command failed",
                    None,
                    Some(json!({"error_code": e.error_code(), "message": e.to_string()})),
                );
                command.send_result(ResultMessage::failure(command.command_id(), e.to_string()));
            }
        }

        self.guard.release(command.command_id());
        command.mark_completed();
        self.slot.clear_if(command.command_id(), job.generation);
    }
}

fn object_extra(payload: Option<&Value>) -> Option<Value> {
    payload.filter(|p| p.is_object()).cloned()
}
