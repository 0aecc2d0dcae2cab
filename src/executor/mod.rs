//! Turns inbound commands into single-flight, cancellable executions.

mod coordinator;
mod running;
mod slot;

pub use coordinator::{ExecutionCoordinator, STOP_TASK_ACTION};
pub use running::RunningCommand;
pub use slot::CurrentCommandSlot;
