mod provider;
mod snapshot;

pub use provider::{JsonFilePerception, PerceptionProvider, StaticPerception};
pub use snapshot::{Bounds, NodeAttributes, NodeId, Snapshot, UiElement, UiNode};
