use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::context::CommandContextRef;
use super::result::CommandResult;
use crate::AutodriveError;

/// `Ok(None)` means the handler forgot to answer; the bus turns it into
/// [`AutodriveError::NoResult`].
pub type HandlerOutput = Result<Option<CommandResult>, AutodriveError>;

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: CommandContextRef, params: Map<String, Value>) -> HandlerOutput;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(CommandContextRef, Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerOutput> + Send + 'static,
{
    async fn handle(&self, ctx: CommandContextRef, params: Map<String, Value>) -> HandlerOutput {
        (self)(ctx, params).await
    }
}

pub type CommandHandlerRef = Arc<dyn CommandHandler>;
