//! Template storage and image comparison.
//!
//! Pixel-level matching is a backend concern; [`TemplateCache`] keeps the
//! templates a run registers and hands them to an optional
//! [`TemplateMatcher`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;

use crate::AutodriveError;

/// Where a template was found on screen, with its confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemplateMatch {
    pub x: i32,
    pub y: i32,
    pub score: f64,
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn store_template(&self, id: &str, image: Vec<u8>) -> Result<(), AutodriveError>;

    async fn find_template(
        &self,
        id: &str,
        threshold: f64,
    ) -> Result<Option<TemplateMatch>, AutodriveError>;

    /// Similarity in `[0, 1]`.
    async fn compare_images(&self, a: &[u8], b: &[u8]) -> Result<f64, AutodriveError>;

    /// Drop every cached template. Called when a scenario run ends.
    fn clear_templates(&self);

    fn template_count(&self) -> usize;
}

/// Locates a template on the current screen.
#[async_trait]
pub trait TemplateMatcher: Send + Sync {
    async fn locate(
        &self,
        template: &[u8],
        threshold: f64,
    ) -> Result<Option<TemplateMatch>, AutodriveError>;
}

#[derive(Default)]
pub struct TemplateCache {
    templates: Mutex<HashMap<String, Arc<Vec<u8>>>>,
    matcher: Option<Arc<dyn TemplateMatcher>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matcher(matcher: Arc<dyn TemplateMatcher>) -> Self {
        Self {
            templates: Mutex::default(),
            matcher: Some(matcher),
        }
    }

    fn template(&self, id: &str) -> Option<Arc<Vec<u8>>> {
        self.templates.lock().ok()?.get(id).cloned()
    }
}

/// Byte-position similarity: identical buffers score 1.0.
pub fn byte_similarity(a: &[u8], b: &[u8]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    let same = a.iter().zip(b).filter(|(x, y)| x == y).count();
    same as f64 / longest as f64
}

#[async_trait]
impl VisionProvider for TemplateCache {
    async fn store_template(&self, id: &str, image: Vec<u8>) -> Result<(), AutodriveError> {
        if image.is_empty() {
            return Err(AutodriveError::Vision(format!("template '{}' is empty", id)));
        }
        let mut templates = self
            .templates
            .lock()
            .map_err(|_| AutodriveError::Vision("template cache poisoned".into()))?;
        templates.insert(id.to_string(), Arc::new(image));
        Ok(())
    }

    async fn find_template(
        &self,
        id: &str,
        threshold: f64,
    ) -> Result<Option<TemplateMatch>, AutodriveError> {
        let template = self
            .template(id)
            .ok_or_else(|| AutodriveError::Vision(format!("unknown template '{}'", id)))?;
        match &self.matcher {
            Some(matcher) => matcher.locate(&template, threshold).await,
            None => Ok(None),
        }
    }

    async fn compare_images(&self, a: &[u8], b: &[u8]) -> Result<f64, AutodriveError> {
        Ok(byte_similarity(a, b))
    }

    fn clear_templates(&self) {
        if let Ok(mut templates) = self.templates.lock() {
            templates.clear();
        }
    }

    fn template_count(&self) -> usize {
        self.templates.lock().map(|t| t.len()).unwrap_or(0)
    }
}

/// Load the bytes behind a normalized file/image parameter
/// (`{value, source: base64|path|url}`).
pub async fn load_image_bytes(param: &Value) -> Result<Vec<u8>, AutodriveError> {
    let value = param
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| AutodriveError::Vision("image parameter has no value".into()))?;
    let source = param.get("source").and_then(Value::as_str).unwrap_or("base64");
    match source {
        "base64" => {
            let payload = value
                .split_once("base64,")
                .map(|(_, data)| data)
                .unwrap_or(value);
            base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| AutodriveError::Vision(format!("invalid base64 image: {}", e)))
        }
        "path" => Ok(tokio::fs::read(value).await?),
        other => Err(AutodriveError::Vision(format!(
            "unsupported image source '{}'",
            other
        ))),
    }
}
