use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

/// Declared type of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    String,
    Int,
    Number,
    Bool,
    Object,
    Array,
    File,
    Image,
    Json,
    Enum,
}

impl ParameterType {
    /// Map a raw type name from a script or capability file. Unknown names
    /// fall back to `String`.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => ParameterType::Int,
            "float" | "double" | "number" => ParameterType::Number,
            "bool" | "boolean" => ParameterType::Bool,
            "object" | "map" | "dict" => ParameterType::Object,
            "array" | "list" => ParameterType::Array,
            "file" => ParameterType::File,
            "image" => ParameterType::Image,
            "json" => ParameterType::Json,
            "enum" => ParameterType::Enum,
            _ => ParameterType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Int => "int",
            ParameterType::Number => "number",
            ParameterType::Bool => "bool",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
            ParameterType::File => "file",
            ParameterType::Image => "image",
            ParameterType::Json => "json",
            ParameterType::Enum => "enum",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterConstraints {
    /// Accept whitespace-only strings for required string parameters.
    pub allow_blank: bool,
    /// Allowed values for enum parameters (and optionally strings).
    pub enum_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Dotted path into the params object, e.g. `config.retries`.
    pub name: String,
    pub param_type: ParameterType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub constraints: ParameterConstraints,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
            description: None,
            constraints: ParameterConstraints::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn allow_blank(mut self) -> Self {
        self.constraints.allow_blank = true;
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("name".into(), json!(self.name));
        out.insert("type".into(), json!(self.param_type.as_str()));
        out.insert("required".into(), json!(self.required));
        if let Some(desc) = &self.description {
            out.insert("description".into(), json!(desc));
        }
        if let Some(default) = &self.default {
            out.insert("default".into(), default.clone());
        }
        if !self.constraints.enum_values.is_empty() {
            out.insert("enum".into(), json!(self.constraints.enum_values));
        }
        Value::Object(out)
    }
}

/// Lazily evaluated capability metadata.
pub type MetadataSupplier = Arc<dyn Fn() -> Value + Send + Sync>;

/// Describes one remotely invokable action.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub action: String,
    pub description: Option<String>,
    pub params: Vec<ParameterSpec>,
    pub metadata: Option<MetadataSupplier>,
}

impl CommandDescriptor {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            description: None,
            params: Vec::new(),
            metadata: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn params<I: IntoIterator<Item = ParameterSpec>>(mut self, specs: I) -> Self {
        self.params.extend(specs);
        self
    }

    pub fn metadata<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.metadata = Some(Arc::new(supplier));
        self
    }

    /// Capability entry. Metadata is evaluated now, so it reflects live state.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("action".into(), json!(self.action));
        if let Some(desc) = &self.description {
            out.insert("description".into(), json!(desc));
        }
        out.insert(
            "params".into(),
            Value::Array(self.params.iter().map(ParameterSpec::to_json).collect()),
        );
        if let Some(meta) = self.metadata.as_ref().map(|f| f()) {
            if !meta.is_null() {
                out.insert("meta".into(), meta);
            }
        }
        Value::Object(out)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("action", &self.action)
            .field("description", &self.description)
            .field("params", &self.params)
            .field("metadata", &self.metadata.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_aliases() {
        assert_eq!(ParameterType::from_raw("Integer"), ParameterType::Int);
        assert_eq!(ParameterType::from_raw("double"), ParameterType::Number);
        assert_eq!(ParameterType::from_raw("dict"), ParameterType::Object);
        assert_eq!(ParameterType::from_raw("list"), ParameterType::Array);
        assert_eq!(ParameterType::from_raw("whatever"), ParameterType::String);
    }

    #[test]
    fn test_capability_entry_shape() {
        let d = CommandDescriptor::new("swipe")
            .describe("Swipe between two points")
            .param(ParameterSpec::new("startX", ParameterType::Int).required())
            .param(ParameterSpec::new("steps", ParameterType::Int).with_default(50));
        assert_eq!(
            d.to_json(),
            json!({
                "action": "swipe",
                "description": "Swipe between two points",
                "params": [
                    {"name": "startX", "type": "int", "required": true},
                    {"name": "steps", "type": "int", "required": false, "default": 50}
                ]
            })
        );
    }

    #[test]
    fn test_metadata_is_evaluated_per_render() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let d = CommandDescriptor::new("start_task")
            .metadata(move || json!({"calls": c.fetch_add(1, Ordering::SeqCst) + 1}));
        assert_eq!(d.to_json()["meta"]["calls"], 1);
        assert_eq!(d.to_json()["meta"]["calls"], 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
