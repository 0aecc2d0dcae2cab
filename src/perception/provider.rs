//! Perception backends.
//!
//! The engine only ever asks for "the current screen"; how the hierarchy is
//! obtained (accessibility service, UI dump tool, replay file) lives behind
//! [`PerceptionProvider`].

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::snapshot::{Snapshot, UiElement};
use crate::AutodriveError;

/// Captures the current UI hierarchy.
#[async_trait]
pub trait PerceptionProvider: Send + Sync {
    /// Capture a snapshot. An empty snapshot means "nothing readable right
    /// now" and is not an error.
    async fn capture(&self) -> Result<Snapshot, AutodriveError>;
}

/// Returns whatever snapshot was last stored. Useful for dry runs and tests.
#[derive(Default)]
pub struct StaticPerception {
    snapshot: RwLock<Snapshot>,
}

impl StaticPerception {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub async fn set(&self, snapshot: Snapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

#[async_trait]
impl PerceptionProvider for StaticPerception {
    async fn capture(&self) -> Result<Snapshot, AutodriveError> {
        Ok(self.snapshot.read().await.clone())
    }
}

/// Reads a JSON hierarchy dump from disk on every capture.
///
/// An external dumper keeps the file fresh; a missing file reads as an empty
/// screen.
pub struct JsonFilePerception {
    path: PathBuf,
}

impl JsonFilePerception {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PerceptionProvider for JsonFilePerception {
    async fn capture(&self) -> Result<Snapshot, AutodriveError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Snapshot::empty());
            }
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Snapshot::empty());
        }
        let root: UiElement = serde_json::from_str(&contents).map_err(|e| {
            AutodriveError::Perception(format!(
                "failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Snapshot::from_root(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty_screen() {
        let dir = TempDir::new().unwrap();
        let provider = JsonFilePerception::new(dir.path().join("ui.json"));
        assert!(provider.capture().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_dump() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ui.json");
        std::fs::write(&path, r#"{"text":"Home","children":[{"text":"Cart"}]}"#).unwrap();
        let snap = JsonFilePerception::new(&path).capture().await.unwrap();
        assert_eq!(snap.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_dump_is_perception_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ui.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonFilePerception::new(&path).capture().await.unwrap_err();
        assert!(matches!(err, AutodriveError::Perception(_)));
    }

    #[tokio::test]
    async fn test_static_perception_set() {
        let provider = StaticPerception::default();
        assert!(provider.capture().await.unwrap().is_empty());
        provider
            .set(Snapshot::from_root(UiElement::default()))
            .await;
        assert_eq!(provider.capture().await.unwrap().len(), 1);
    }
}
