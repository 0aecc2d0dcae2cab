//! Scene handler lookup.
//!
//! Scripts refer to handlers by name. Providers are asked in registration
//! order; the first one that supports the script and knows the name wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::scenario::{FixedOutcome, ScenarioContext, SceneHandler, SceneOutcome};
use crate::AutodriveError;

pub trait HandlerProvider: Send + Sync {
    fn supports(&self, script: &str) -> bool;

    fn resolve(&self, handler: &str) -> Option<Arc<dyn SceneHandler>>;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    providers: Vec<Arc<dyn HandlerProvider>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [`BuiltinHandlers`] as its only provider.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BuiltinHandlers::new()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn HandlerProvider>) {
        self.providers.push(provider);
    }

    pub fn resolve(&self, script: &str, handler: &str) -> Option<Arc<dyn SceneHandler>> {
        self.providers
            .iter()
            .filter(|p| p.supports(script))
            .find_map(|p| p.resolve(handler))
    }
}

/// Handlers that only read the context or press system keys. Available to
/// every script.
pub struct BuiltinHandlers {
    handlers: HashMap<&'static str, Arc<dyn SceneHandler>>,
}

impl Default for BuiltinHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinHandlers {
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Arc<dyn SceneHandler>> = HashMap::new();
        handlers.insert("continue", Arc::new(FixedOutcome(SceneOutcome::Continue)));
        handlers.insert("succeed", Arc::new(FixedOutcome(SceneOutcome::Success)));
        handlers.insert("stop", Arc::new(FixedOutcome(SceneOutcome::Stop)));
        handlers.insert("fail", Arc::new(FixedOutcome(SceneOutcome::Error)));
        handlers.insert("press_back", Arc::new(KeyPress::Back));
        handlers.insert("press_home", Arc::new(KeyPress::Home));
        handlers.insert("count_visit", Arc::new(CountVisit));
        Self { handlers }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl HandlerProvider for BuiltinHandlers {
    fn supports(&self, _script: &str) -> bool {
        true
    }

    fn resolve(&self, handler: &str) -> Option<Arc<dyn SceneHandler>> {
        self.handlers.get(handler).cloned()
    }
}

enum KeyPress {
    Back,
    Home,
}

#[async_trait]
impl SceneHandler for KeyPress {
    async fn handle(&self, ctx: &mut ScenarioContext) -> Result<SceneOutcome, AutodriveError> {
        let device = ctx.device()?;
        match self {
            KeyPress::Back => device.press_back().await?,
            KeyPress::Home => device.press_home().await?,
        }
        Ok(SceneOutcome::Continue)
    }
}

/// Bumps `visits.<scene>` for the scene that matched last.
struct CountVisit;

#[async_trait]
impl SceneHandler for CountVisit {
    async fn handle(&self, ctx: &mut ScenarioContext) -> Result<SceneOutcome, AutodriveError> {
        let scene = ctx.current_scene().unwrap_or("unknown").to_string();
        let path = format!("visits.{}", scene);
        let count = ctx.get(&path).and_then(Value::as_u64).unwrap_or(0) + 1;
        ctx.set(&path, Value::from(count));
        Ok(SceneOutcome::Continue)
    }
}
