use std::sync::Arc;

use moka::future::Cache;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::command::{ParameterSpec, ParameterType};
use crate::script::{ScenarioScript, ScriptRepository};
use crate::AutodriveError;

const MAX_CACHED_SCRIPTS: u64 = 256;

/// Loaded scripts plus the metadata built from them.
///
/// Capability listings are synchronous, so metadata is rendered from the
/// scripts cached by the last [`refresh`](Self::refresh) or load.
pub struct ScenarioCatalog {
    repository: Arc<dyn ScriptRepository>,
    scripts: Cache<String, Arc<ScenarioScript>>,
}

impl ScenarioCatalog {
    pub fn new(repository: Arc<dyn ScriptRepository>) -> Self {
        Self {
            repository,
            scripts: Cache::builder().max_capacity(MAX_CACHED_SCRIPTS).build(),
        }
    }

    /// Load a script from the repository, replacing any cached copy.
    pub async fn require_script(&self, name: &str) -> Result<Arc<ScenarioScript>, AutodriveError> {
        let script = Arc::new(self.repository.load(name).await?);
        self.scripts.insert(name.to_string(), Arc::clone(&script)).await;
        Ok(script)
    }

    /// Names known to the repository. Listing failures read as "no scripts".
    pub async fn list_names(&self) -> Vec<String> {
        match self.repository.list_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list scripts");
                Vec::new()
            }
        }
    }

    /// Reload every script. Scripts that fail to load are skipped with a
    /// warning. Returns how many were cached.
    pub async fn refresh(&self) -> usize {
        self.scripts.invalidate_all();
        let mut loaded = 0;
        for name in self.list_names().await {
            match self.require_script(&name).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!(script = %name, error = %e, "Skipping script"),
            }
        }
        self.scripts.run_pending_tasks().await;
        info!(loaded, "Script catalog refreshed");
        loaded
    }

    /// Cached scripts, sorted by directory name.
    pub fn cached(&self) -> Vec<(String, Arc<ScenarioScript>)> {
        let mut scripts: Vec<_> = self
            .scripts
            .iter()
            .map(|(name, script)| (name.as_ref().clone(), script))
            .collect();
        scripts.sort_by(|a, b| a.0.cmp(&b.0));
        scripts
    }

    /// `{scripts: [...]}` for the `start_task` capability entry.
    pub fn catalog_metadata(&self) -> Value {
        let scripts: Vec<Value> = self
            .cached()
            .iter()
            .map(|(_, script)| script.to_json())
            .collect();
        json!({ "scripts": scripts })
    }

    /// Parameters advertised by `start_task:<name>`.
    pub fn capability_parameters(name: &str, script: &ScenarioScript) -> Vec<ParameterSpec> {
        std::iter::once(
            ParameterSpec::new("task_name", ParameterType::String)
                .required()
                .with_default(name)
                .describe("Script name"),
        )
        .chain(script.parameters.iter().map(|p| p.to_spec("config")))
        .collect()
    }
}
