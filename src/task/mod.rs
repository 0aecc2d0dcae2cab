//! Script tasks: catalog, parameter binding and run coordination.

mod binder;
mod catalog;
mod coordinator;
mod reporter;
mod service;

pub use binder::{ScenarioParameterBinder, TaskRequest};
pub use catalog::ScenarioCatalog;
pub use coordinator::{ScenarioProviders, ScenarioRunCoordinator};
pub use reporter::CommandScenarioReporter;
pub use service::ScenarioTaskService;
