pub mod harness;

// Re-export commonly used test utilities
pub use harness::{
    screen, scenario_context, text, wait_until, RecordingOutbound, ScriptedPerception, TestApp,
};
