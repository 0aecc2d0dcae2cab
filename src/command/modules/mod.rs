//! Built-in command modules.

mod device;
mod diagnostics;
mod scenario;
mod vision;

pub use device::DeviceInteractionModule;
pub use diagnostics::DiagnosticsCommandModule;
pub use scenario::ScenarioCommandModule;
pub use vision::VisionCommandModule;

use serde_json::{Map, Value};

use crate::AutodriveError;

// Accessors for already-normalized params.

pub(crate) fn int_param(params: &Map<String, Value>, name: &str) -> Result<i64, AutodriveError> {
    params
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| AutodriveError::invalid(name, "missing parameter"))
}

pub(crate) fn float_param(params: &Map<String, Value>, name: &str) -> Result<f64, AutodriveError> {
    params
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| AutodriveError::invalid(name, "missing parameter"))
}

pub(crate) fn str_param<'a>(
    params: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a str, AutodriveError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| AutodriveError::invalid(name, "missing parameter"))
}

pub(crate) fn coord(params: &Map<String, Value>, name: &str) -> Result<i32, AutodriveError> {
    let value = int_param(params, name)?;
    i32::try_from(value).map_err(|_| AutodriveError::invalid(name, "coordinate out of range"))
}
