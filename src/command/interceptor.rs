//! Middleware around command handlers.
//!
//! Interceptors run in registration order. Each one receives a [`Next`] that
//! it must consume with [`Next::proceed`] or short-circuit by returning an
//! error. Returning `Ok` without proceeding is a contract violation the bus
//! reports as [`AutodriveError::InterceptorContract`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{error, info};

use super::context::{CommandContextRef, LogLevel};
use super::descriptor::CommandDescriptor;
use super::handler::{CommandHandlerRef, HandlerOutput};
use crate::AutodriveError;

/// A validated command on its way to the handler.
pub struct Invocation {
    pub context: CommandContextRef,
    pub descriptor: Arc<CommandDescriptor>,
    pub params: Map<String, Value>,
}

/// The remainder of the chain. Consumed on use, so it can run at most once.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn CommandInterceptor>],
    handler: &'a CommandHandlerRef,
    invocation: &'a Invocation,
    called: &'a AtomicBool,
}

impl Next<'_> {
    pub async fn proceed(self) -> HandlerOutput {
        self.called.store(true, Ordering::SeqCst);
        run_chain(self.remaining, self.handler, self.invocation).await
    }
}

#[async_trait]
pub trait CommandInterceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn intercept(&self, invocation: &Invocation, next: Next<'_>) -> HandlerOutput;
}

pub(crate) fn run_chain<'a>(
    interceptors: &'a [Arc<dyn CommandInterceptor>],
    handler: &'a CommandHandlerRef,
    invocation: &'a Invocation,
) -> BoxFuture<'a, HandlerOutput> {
    Box::pin(async move {
        let Some((first, rest)) = interceptors.split_first() else {
            return handler
                .handle(Arc::clone(&invocation.context), invocation.params.clone())
                .await;
        };
        let called = AtomicBool::new(false);
        let next = Next {
            remaining: rest,
            handler,
            invocation,
            called: &called,
        };
        let out = first.intercept(invocation, next).await;
        if out.is_ok() && !called.load(Ordering::SeqCst) {
            return Err(AutodriveError::InterceptorContract(first.name().to_string()));
        }
        out
    })
}

/// Times every command and reports the outcome as a log message.
pub struct LoggingInterceptor;

#[async_trait]
impl CommandInterceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    async fn intercept(&self, invocation: &Invocation, next: Next<'_>) -> HandlerOutput {
        let action = invocation.descriptor.action.as_str();
        let ctx = &invocation.context;
        let started = Instant::now();
        let out = next.proceed().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &out {
            Ok(Some(result)) => {
                let message = result.message_or("");
                info!(
                    command_id = ctx.command_id(),
                    action,
                    duration_ms,
                    success = result.success,
                    "Command finished"
                );
                let level = if result.success {
                    LogLevel::Info
                } else {
                    LogLevel::Error
                };
                ctx.report_log(
                    level,
                    &format!("{} finished", action),
                    Some(json!({"duration_ms": duration_ms, "result_message": message})),
                );
            }
            Ok(None) => {}
            Err(e) => {
                error!(command_id = ctx.command_id(), action, duration_ms, error = %e, "Command failed");
                ctx.report_log(
                    LogLevel::Error,
                    &format!("{} failed: {}", action, e),
                    Some(json!({"duration_ms": duration_ms, "error_code": e.error_code()})),
                );
            }
        }
        out
    }
}
