//! Scene-driven script execution.

mod context;
mod engine;
mod reporter;
mod result;
mod runner;
mod scene;
mod selector;
mod signature;
mod telemetry;

pub use context::{ScenarioContext, ScenarioContextBuilder};
pub use engine::{EngineOptions, ScenarioEngine, DEFAULT_NO_MATCH_TIMEOUT, DEFAULT_POLL_INTERVAL};
pub use reporter::{noop_reporter, CompositeReporter, NoopReporter, ScenarioReporter, TracingReporter};
pub use result::{RunStatus, ScenarioRunResult};
pub use runner::ScenarioRunner;
pub use scene::{handler_fn, FixedOutcome, FnHandler, Scene, SceneHandler, SceneOutcome};
pub use selector::{SelectorBuilder, SelectorCondition, DEFAULT_SELECTOR_TIMEOUT_MS};
pub use signature::SceneSignature;
pub use telemetry::TelemetryCollector;
