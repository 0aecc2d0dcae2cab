use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::model::{ProjectFile, ScenarioScript, ScenesFile};
use crate::utils::validate_script_name;
use crate::AutodriveError;

const PROJECT_FILE: &str = "project.yaml";
const SCENES_FILE: &str = "scenes.yaml";

/// Source of scenario scripts.
#[async_trait]
pub trait ScriptRepository: Send + Sync {
    async fn load(&self, name: &str) -> Result<ScenarioScript, AutodriveError>;

    /// Names of every loadable script, sorted.
    async fn list_names(&self) -> Result<Vec<String>, AutodriveError>;
}

/// Scripts stored as `<root>/<name>/{project,scenes}.yaml`.
pub struct DirScriptRepository {
    root: PathBuf,
}

impl DirScriptRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_yaml<T: DeserializeOwned + Default>(
        path: &Path,
        required: bool,
    ) -> Result<T, AutodriveError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound && !required => return Ok(T::default()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AutodriveError::Script(format!("{} not found", path.display())))
            }
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        serde_yaml_ng::from_str(&text)
            .map_err(|e| AutodriveError::Script(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ScriptRepository for DirScriptRepository {
    async fn load(&self, name: &str) -> Result<ScenarioScript, AutodriveError> {
        let name = validate_script_name(name)?;
        let dir = self.root.join(name);
        let project: ProjectFile = Self::read_yaml(&dir.join(PROJECT_FILE), true).await?;
        let scenes: ScenesFile = Self::read_yaml(&dir.join(SCENES_FILE), false).await?;
        let script = ScenarioScript::from_files(name, project, scenes);
        debug!(script = %script.name, scenes = script.scenes.len(), "Script loaded");
        Ok(script)
    }

    async fn list_names(&self) -> Result<Vec<String>, AutodriveError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(root = %self.root.display(), "Scripts directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if validate_script_name(&name).is_err() {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(PROJECT_FILE))
                .await
                .unwrap_or(false)
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
