pub mod json_path;
pub mod resolver;
pub mod sanitize;

pub use resolver::VariableResolver;
pub use sanitize::{task_action_script, validate_script_name, TASK_ACTION_PREFIX};
