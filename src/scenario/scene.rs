use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::ScenarioContext;
use super::signature::SceneSignature;
use crate::perception::Snapshot;
use crate::utils::VariableResolver;
use crate::AutodriveError;

/// What a scene handler wants the engine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneOutcome {
    /// Keep looping.
    Continue,
    /// The script reached its goal.
    Success,
    /// Stop on purpose; the run ends as stopped.
    Stop,
    /// Something went wrong but the loop keeps going.
    Error,
}

/// Reacts to a matched scene, typically by driving the device.
#[async_trait]
pub trait SceneHandler: Send + Sync {
    async fn handle(&self, ctx: &mut ScenarioContext) -> Result<SceneOutcome, AutodriveError>;
}

/// Always yields the same outcome.
pub struct FixedOutcome(pub SceneOutcome);

#[async_trait]
impl SceneHandler for FixedOutcome {
    async fn handle(&self, _ctx: &mut ScenarioContext) -> Result<SceneOutcome, AutodriveError> {
        Ok(self.0)
    }
}

/// Adapts a synchronous closure into a handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> SceneHandler for FnHandler<F>
where
    F: Fn(&mut ScenarioContext) -> Result<SceneOutcome, AutodriveError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut ScenarioContext) -> Result<SceneOutcome, AutodriveError> {
        (self.0)(ctx)
    }
}

pub fn handler_fn<F>(f: F) -> Arc<dyn SceneHandler>
where
    F: Fn(&mut ScenarioContext) -> Result<SceneOutcome, AutodriveError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// A recognisable screen state plus the reaction to it.
#[derive(Clone)]
pub struct Scene {
    pub id: String,
    pub description: Option<String>,
    /// `None` (or an empty signature) matches any non-empty snapshot.
    pub signature: Option<SceneSignature>,
    pub handler: Arc<dyn SceneHandler>,
    /// Scene ids removed from the active set when this scene matches.
    pub prune: Vec<String>,
}

impl Scene {
    pub fn new(id: impl Into<String>, handler: Arc<dyn SceneHandler>) -> Self {
        Self {
            id: id.into(),
            description: None,
            signature: None,
            handler,
            prune: Vec::new(),
        }
    }

    pub fn with_signature(mut self, signature: SceneSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_prune<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prune = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, snapshot: &Snapshot, resolver: &VariableResolver) -> bool {
        match &self.signature {
            Some(sig) if !sig.is_empty() => sig.matches(snapshot, resolver),
            _ => true,
        }
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("signature", &self.signature)
            .field("prune", &self.prune)
            .finish_non_exhaustive()
    }
}
