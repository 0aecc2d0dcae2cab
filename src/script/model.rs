//! On-disk script format.
//!
//! A script is a directory holding `project.yaml` (metadata, entry scene,
//! parameter declarations) and `scenes.yaml` (the scene graph). Scenes are
//! kept in their raw form until [`ScenarioScript::materialize`] binds handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::handlers::HandlerRegistry;
use crate::command::{ParameterSpec, ParameterType};
use crate::scenario::{Scene, SceneSignature};
use crate::AutodriveError;

/// Handler bound to scenes that name none.
pub const DEFAULT_HANDLER: &str = "continue";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProjectFile {
    pub metadata: ProjectMetadata,
    pub entry: EntrySection,
    pub parameters: ParameterSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProjectMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EntrySection {
    pub init_scene: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ParameterSection {
    pub required: Vec<RawParameter>,
    pub optional: Vec<RawParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
    pub description: Option<String>,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ScenesFile {
    pub scenes: Vec<SceneDefinition>,
}

/// A string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureDefinition {
    pub required_all: Option<Value>,
    pub required_any: Option<Value>,
    pub forbidden_any: Option<Value>,
    pub forbidden_all: Option<Value>,
}

impl SignatureDefinition {
    pub fn parse(&self) -> Result<SceneSignature, AutodriveError> {
        Ok(SceneSignature {
            required_all: SceneSignature::parse_group(self.required_all.as_ref())?,
            required_any: SceneSignature::parse_group(self.required_any.as_ref())?,
            forbidden_any: SceneSignature::parse_group(self.forbidden_any.as_ref())?,
            forbidden_all: SceneSignature::parse_group(self.forbidden_all.as_ref())?,
        })
    }
}

/// One scene as written in `scenes.yaml`.
#[derive(Debug, Clone, Serialize)]
pub struct SceneDefinition {
    pub id: String,
    pub description: Option<String>,
    pub signature: Option<SignatureDefinition>,
    pub handler: Option<String>,
    pub del_scenes: Vec<String>,
}

impl<'de> Deserialize<'de> for SceneDefinition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            id: String,
            #[serde(default)]
            description: Option<String>,
            #[serde(default)]
            signature: Option<SignatureDefinition>,
            #[serde(default)]
            handler: Option<String>,
            #[serde(default)]
            del_scenes: Option<OneOrMany>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(SceneDefinition {
            id: raw.id,
            description: raw.description,
            signature: raw.signature,
            handler: raw.handler.filter(|h| !h.trim().is_empty()),
            del_scenes: raw.del_scenes.map(Vec::from).unwrap_or_default(),
        })
    }
}

/// A declared script parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ScriptParameter {
    fn from_raw(raw: RawParameter, required: bool) -> Self {
        Self {
            name: raw.name,
            param_type: raw.param_type.unwrap_or_else(|| "string".to_string()),
            required,
            description: raw.description,
            default: raw.default.filter(|d| !d.is_null()),
        }
    }

    /// Validator spec for this parameter, placed under `prefix`.
    pub fn to_spec(&self, prefix: &str) -> ParameterSpec {
        let name = if prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", prefix, self.name)
        };
        let mut spec = ParameterSpec::new(name, ParameterType::from_raw(&self.param_type));
        if self.required {
            spec = spec.required();
        }
        if let Some(default) = &self.default {
            spec = spec.with_default(default.clone());
        }
        if let Some(description) = &self.description {
            spec = spec.describe(description.clone());
        }
        spec
    }
}

/// A loaded script: metadata plus unresolved scenes.
#[derive(Debug, Clone)]
pub struct ScenarioScript {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub init_scene: Option<String>,
    pub parameters: Vec<ScriptParameter>,
    pub scenes: Vec<SceneDefinition>,
}

impl ScenarioScript {
    pub(crate) fn from_files(dir_name: &str, project: ProjectFile, scenes: ScenesFile) -> Self {
        let ProjectFile {
            metadata,
            entry,
            parameters,
        } = project;
        let params = parameters
            .required
            .into_iter()
            .map(|p| ScriptParameter::from_raw(p, true))
            .chain(
                parameters
                    .optional
                    .into_iter()
                    .map(|p| ScriptParameter::from_raw(p, false)),
            )
            .collect();
        Self {
            name: metadata
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| dir_name.to_string()),
            version: metadata.version.filter(|v| !v.is_empty()),
            description: metadata.description.filter(|d| !d.is_empty()),
            init_scene: entry.init_scene.filter(|s| !s.is_empty()),
            parameters: params,
            scenes: scenes.scenes,
        }
    }

    /// Declared defaults, keyed by parameter name.
    pub fn defaults(&self) -> Map<String, Value> {
        self.parameters
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect()
    }

    /// Parse signatures and bind handlers. Fails on the first unknown
    /// handler or malformed selector.
    pub fn materialize(&self, registry: &HandlerRegistry) -> Result<Vec<Scene>, AutodriveError> {
        self.scenes
            .iter()
            .map(|def| {
                let handler_name = def.handler.as_deref().unwrap_or(DEFAULT_HANDLER);
                let handler = registry.resolve(&self.name, handler_name).ok_or_else(|| {
                    AutodriveError::UnknownHandler {
                        script: self.name.clone(),
                        handler: handler_name.to_string(),
                    }
                })?;
                let mut scene = Scene::new(def.id.clone(), handler).with_prune(def.del_scenes.clone());
                if let Some(description) = &def.description {
                    scene = scene.with_description(description.clone());
                }
                if let Some(signature) = &def.signature {
                    let parsed = signature.parse().map_err(|e| {
                        AutodriveError::Script(format!("scene '{}': {}", def.id, e))
                    })?;
                    scene = scene.with_signature(parsed);
                }
                Ok(scene)
            })
            .collect()
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("name".into(), Value::String(self.name.clone()));
        if let Some(version) = &self.version {
            out.insert("version".into(), Value::String(version.clone()));
        }
        if let Some(description) = &self.description {
            out.insert("description".into(), Value::String(description.clone()));
        }
        out.insert(
            "parameters".into(),
            serde_json::to_value(&self.parameters).unwrap_or(Value::Array(Vec::new())),
        );
        Value::Object(out)
    }
}
