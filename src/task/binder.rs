use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::catalog::ScenarioCatalog;
use crate::command::{ParameterSpec, ParameterType, ParameterValidator};
use crate::script::ScenarioScript;
use crate::utils::validate_script_name;
use crate::AutodriveError;

/// A validated request to run one script.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task_name: String,
    pub script: Arc<ScenarioScript>,
    /// Seed for the scenario context: defaults, then config, then `task_name`.
    pub context_data: Map<String, Value>,
    /// Config as normalized against the script's declared parameters.
    pub config: Map<String, Value>,
}

/// Merges script defaults with caller config and validates the result.
pub struct ScenarioParameterBinder {
    catalog: Arc<ScenarioCatalog>,
}

impl ScenarioParameterBinder {
    pub fn new(catalog: Arc<ScenarioCatalog>) -> Self {
        Self { catalog }
    }

    /// Parameters of the generic `start_task` action.
    pub fn base_parameters() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new("task_name", ParameterType::String)
                .required()
                .describe("Script name"),
            ParameterSpec::new("config", ParameterType::Object)
                .with_default(json!({}))
                .describe("Script configuration"),
        ]
    }

    fn schema(task_name: &str, script: &ScenarioScript) -> Vec<ParameterSpec> {
        let mut specs = ScenarioCatalog::capability_parameters(task_name, script);
        specs.insert(1, Self::base_parameters().remove(1));
        specs
    }

    pub async fn bind(&self, params: &Map<String, Value>) -> Result<TaskRequest, AutodriveError> {
        let raw_name = params
            .get("task_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let task_name = validate_script_name(raw_name)?.to_string();
        let script = self.catalog.require_script(&task_name).await?;
        debug!(task = %task_name, script = %script.name, "Binding task parameters");

        let config = match params.get("config") {
            Some(Value::Object(config)) => Value::Object(config.clone()),
            _ => json!({}),
        };
        let payload = json!({ "task_name": task_name, "config": config });
        let specs = Self::schema(&task_name, &script);
        let mut normalized = ParameterValidator::new(&specs).validate(&payload)?;

        let config = match normalized.remove("config") {
            Some(Value::Object(config)) => config,
            _ => Map::new(),
        };
        let mut context_data = script.defaults();
        context_data.extend(config.clone());
        context_data.insert("task_name".into(), Value::String(task_name.clone()));

        Ok(TaskRequest {
            task_name,
            script,
            context_data,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::DirScriptRepository;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
metadata:
  name: demo
  version: "2"
parameters:
  required:
    - name: account
      type: string
  optional:
    - name: retries
      type: int
      default: 3
    - name: region
      default: eu
"#;

    fn fixture() -> (TempDir, ScenarioParameterBinder, Arc<ScenarioCatalog>) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("demo");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("project.yaml"), PROJECT).unwrap();
        let catalog = Arc::new(ScenarioCatalog::new(Arc::new(DirScriptRepository::new(
            tmp.path(),
        ))));
        (tmp, ScenarioParameterBinder::new(catalog.clone()), catalog)
    }

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_defaults_then_config_then_task_name() {
        let (_tmp, binder, _) = fixture();
        let req = binder
            .bind(&params(json!({
                "task_name": "demo",
                "config": {"account": "a@b", "retries": "5", "extra": true}
            })))
            .await
            .unwrap();
        assert_eq!(
            Value::Object(req.context_data),
            json!({"retries": 5, "region": "eu", "account": "a@b", "extra": true, "task_name": "demo"})
        );
        assert_eq!(req.config["retries"], 5);
    }

    #[tokio::test]
    async fn test_missing_required_config() {
        let (_tmp, binder, _) = fixture();
        let err = binder
            .bind(&params(json!({"task_name": "demo"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AutodriveError::InvalidParameter { name, .. } if name == "config.account"));
    }

    #[tokio::test]
    async fn test_unknown_and_blank_task() {
        let (_tmp, binder, _) = fixture();
        assert!(binder.bind(&params(json!({"task_name": "  "}))).await.is_err());
        assert!(matches!(
            binder.bind(&params(json!({"task_name": "nope"}))).await,
            Err(AutodriveError::Script(_))
        ));
    }

    #[tokio::test]
    async fn test_catalog_metadata_after_refresh() {
        let (_tmp, _binder, catalog) = fixture();
        assert_eq!(catalog.refresh().await, 1);
        let meta = catalog.catalog_metadata();
        assert_eq!(meta["scripts"][0]["name"], "demo");
        assert_eq!(meta["scripts"][0]["version"], "2");
        assert_eq!(meta["scripts"][0]["parameters"][1]["default"], 3);
    }
}
