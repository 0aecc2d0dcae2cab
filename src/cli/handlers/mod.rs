//! CLI command handlers.

pub mod agent;
pub mod capabilities;
pub mod exec;
pub mod scripts;
