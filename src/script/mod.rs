//! Script storage and handler binding.

mod handlers;
mod model;
mod repository;

pub use handlers::{BuiltinHandlers, HandlerProvider, HandlerRegistry};
pub use model::{
    ScenarioScript, SceneDefinition, ScriptParameter, SignatureDefinition, DEFAULT_HANDLER,
};
pub use repository::{DirScriptRepository, ScriptRepository};
