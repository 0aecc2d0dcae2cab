pub mod cli;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod guard;
pub mod init;
pub mod perception;
pub mod scenario;
pub mod script;
pub mod session;
pub mod task;
pub mod utils;
pub mod vision;

pub use error::AutodriveError;
