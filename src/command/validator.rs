//! Parameter normalization.
//!
//! Converts untyped remote params into the shapes handlers expect, applying
//! defaults and rejecting missing or malformed required values. Keys no
//! descriptor mentions pass through untouched.

use serde_json::{json, Map, Value};
use tracing::debug;

use super::descriptor::{ParameterSpec, ParameterType};
use crate::utils::json_path;
use crate::AutodriveError;

pub struct ParameterValidator<'a> {
    specs: &'a [ParameterSpec],
}

impl<'a> ParameterValidator<'a> {
    pub fn new(specs: &'a [ParameterSpec]) -> Self {
        Self { specs }
    }

    /// Normalize `raw`. A missing or null params value is treated as `{}`.
    pub fn validate(&self, raw: &Value) -> Result<Map<String, Value>, AutodriveError> {
        let source = match raw {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => {
                return Err(AutodriveError::InvalidParameter {
                    name: "params".into(),
                    reason: "params must be an object".into(),
                })
            }
        };
        let mut result = source.clone();

        for spec in self.specs {
            let value = match json_path::get_present(&source, &spec.name) {
                Some(v) => v.clone(),
                None => match &spec.default {
                    Some(default) if !default.is_null() => default.clone(),
                    _ if spec.required => {
                        return Err(AutodriveError::invalid(&spec.name, "missing parameter"))
                    }
                    _ => continue,
                },
            };

            match convert(spec, value)? {
                Some(converted) => {
                    debug!(param = %spec.name, value = %converted, "Parameter normalized");
                    json_path::set(&mut result, &spec.name, converted);
                }
                None if spec.required => {
                    return Err(AutodriveError::invalid(&spec.name, "parameter is empty"))
                }
                None => {
                    json_path::remove(&mut result, &spec.name);
                }
            }
        }
        Ok(result)
    }
}

fn convert(spec: &ParameterSpec, raw: Value) -> Result<Option<Value>, AutodriveError> {
    if raw.is_null() {
        return Ok(None);
    }
    let converted = match spec.param_type {
        ParameterType::Int => to_int(spec, &raw)?,
        ParameterType::Number => to_number(spec, &raw)?,
        ParameterType::Bool => to_bool(spec, &raw)?,
        ParameterType::Object | ParameterType::Json => to_object(spec, raw)?,
        ParameterType::Array => to_array(spec, raw)?,
        ParameterType::File | ParameterType::Image => to_file(spec, raw)?,
        ParameterType::Enum => to_enum(spec, &raw)?,
        ParameterType::String => to_string(spec, &raw)?,
    };
    Ok(Some(converted))
}

fn to_int(spec: &ParameterSpec, raw: &Value) -> Result<Value, AutodriveError> {
    let parsed = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .map(Value::from)
        .ok_or_else(|| AutodriveError::mismatch(&spec.name, "int"))
}

fn to_number(spec: &ParameterSpec, raw: &Value) -> Result<Value, AutodriveError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    };
    parsed
        .map(|f| json!(f))
        .ok_or_else(|| AutodriveError::mismatch(&spec.name, "number"))
}

fn to_bool(spec: &ParameterSpec, raw: &Value) -> Result<Value, AutodriveError> {
    let text = match raw {
        Value::Bool(b) => return Ok(Value::Bool(*b)),
        Value::String(s) => s.trim().to_ascii_lowercase(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    match text.as_str() {
        "1" | "true" => Ok(Value::Bool(true)),
        "0" | "false" => Ok(Value::Bool(false)),
        _ => Err(AutodriveError::mismatch(&spec.name, "bool")),
    }
}

fn to_object(spec: &ParameterSpec, raw: Value) -> Result<Value, AutodriveError> {
    match raw {
        obj @ Value::Object(_) => Ok(obj),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(obj @ Value::Object(_)) => Ok(obj),
            _ => Err(AutodriveError::mismatch(&spec.name, "JSON object")),
        },
        _ => Err(AutodriveError::mismatch(&spec.name, "JSON object")),
    }
}

fn to_array(spec: &ParameterSpec, raw: Value) -> Result<Value, AutodriveError> {
    match raw {
        arr @ Value::Array(_) => Ok(arr),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(arr @ Value::Array(_)) => Ok(arr),
            _ => Err(AutodriveError::mismatch(&spec.name, "JSON array")),
        },
        _ => Err(AutodriveError::mismatch(&spec.name, "JSON array")),
    }
}

fn infer_source(value: &str) -> &'static str {
    let lower = value.to_ascii_lowercase();
    if ["http://", "https://", "content://", "file://"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        "url"
    } else if value.starts_with('/') || value.starts_with("./") || lower.starts_with("sdcard") {
        "path"
    } else {
        "base64"
    }
}

fn to_file(spec: &ParameterSpec, raw: Value) -> Result<Value, AutodriveError> {
    let mut payload = match raw {
        Value::Object(map) => map,
        Value::Array(_) => return Err(AutodriveError::mismatch(&spec.name, "file")),
        scalar => {
            let mut map = Map::new();
            map.insert("value".into(), Value::String(json_path::render(&scalar)));
            map
        }
    };

    let has_source = payload
        .get("source")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !has_source {
        let value = payload.get("value").and_then(Value::as_str).unwrap_or("");
        let source = infer_source(value);
        payload.insert("source".into(), json!(source));
    }

    if !payload.contains_key("value") {
        return Err(AutodriveError::invalid(&spec.name, "file parameter has no value"));
    }

    if spec.param_type == ParameterType::Image && !payload.contains_key("mime") {
        payload.insert("mime".into(), json!("image/*"));
    }
    payload.insert("type".into(), json!(spec.param_type.as_str()));
    Ok(Value::Object(payload))
}

fn to_string(spec: &ParameterSpec, raw: &Value) -> Result<Value, AutodriveError> {
    let value = json_path::render(raw);
    if spec.required && !spec.constraints.allow_blank && value.trim().is_empty() {
        return Err(AutodriveError::invalid(&spec.name, "parameter is blank"));
    }
    check_enum(spec, &value)?;
    Ok(Value::String(value))
}

fn to_enum(spec: &ParameterSpec, raw: &Value) -> Result<Value, AutodriveError> {
    let value = json_path::render(raw);
    if spec.constraints.enum_values.is_empty() {
        return Err(AutodriveError::invalid(&spec.name, "enum has no allowed values"));
    }
    check_enum(spec, &value)?;
    Ok(Value::String(value))
}

fn check_enum(spec: &ParameterSpec, value: &str) -> Result<(), AutodriveError> {
    let allowed = &spec.constraints.enum_values;
    if !allowed.is_empty() && !allowed.iter().any(|v| v == value) {
        return Err(AutodriveError::invalid(
            &spec.name,
            format!("'{}' is not one of [{}]", value, allowed.join(", ")),
        ));
    }
    Ok(())
}
