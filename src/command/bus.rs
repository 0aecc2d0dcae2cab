use std::future::Future;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::context::CommandContextRef;
use super::descriptor::CommandDescriptor;
use super::handler::{CommandHandler, CommandHandlerRef, HandlerOutput};
use super::interceptor::{run_chain, CommandInterceptor, Invocation};
use super::result::CommandResult;
use super::validator::ParameterValidator;
use crate::AutodriveError;

struct Registration {
    descriptor: Arc<CommandDescriptor>,
    handler: Option<CommandHandlerRef>,
}

/// Action registry and dispatcher.
///
/// Registration order is kept for capability listings; re-registering an
/// action replaces it in place.
#[derive(Default)]
pub struct CommandBus {
    registry: RwLock<IndexMap<String, Registration>>,
    interceptors: RwLock<Vec<Arc<dyn CommandInterceptor>>>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: CommandDescriptor, handler: impl CommandHandler + 'static) {
        self.insert(descriptor, Some(Arc::new(handler)));
    }

    /// Register a closure. Separate from [`register`](Self::register) so the
    /// closure's argument types can be inferred.
    pub fn register_fn<F, Fut>(&self, descriptor: CommandDescriptor, f: F)
    where
        F: Fn(CommandContextRef, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutput> + Send + 'static,
    {
        self.insert(descriptor, Some(Arc::new(f)));
    }

    /// Advertise an action without a handler. Dispatching it fails with
    /// [`AutodriveError::NoHandler`].
    pub fn register_descriptor(&self, descriptor: CommandDescriptor) {
        self.insert(descriptor, None);
    }

    fn insert(&self, descriptor: CommandDescriptor, handler: Option<CommandHandlerRef>) {
        let action = descriptor.action.clone();
        debug!(action = %action, has_handler = handler.is_some(), "Registering command");
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.insert(
            action,
            Registration {
                descriptor: Arc::new(descriptor),
                handler,
            },
        );
    }

    pub fn add_interceptor(&self, interceptor: Arc<dyn CommandInterceptor>) {
        self.interceptors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(interceptor);
    }

    pub fn contains(&self, action: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(action)
    }

    pub fn actions(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn descriptor(&self, action: &str) -> Option<Arc<CommandDescriptor>> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(action)
            .map(|r| Arc::clone(&r.descriptor))
    }

    /// Capability listing, built from the live registry.
    pub fn capabilities(&self) -> Value {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        Value::Array(registry.values().map(|r| r.descriptor.to_json()).collect())
    }

    /// Validate params and run the interceptor chain and handler.
    #[instrument(skip(self, context, raw_params), fields(command_id = context.command_id()))]
    pub async fn dispatch(
        &self,
        context: CommandContextRef,
        action: &str,
        raw_params: &Value,
    ) -> Result<CommandResult, AutodriveError> {
        let (descriptor, handler) = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            let registration = registry
                .get(action)
                .ok_or_else(|| AutodriveError::UnknownAction(action.to_string()))?;
            (
                Arc::clone(&registration.descriptor),
                registration.handler.clone(),
            )
        };
        let handler = handler.ok_or_else(|| AutodriveError::NoHandler(action.to_string()))?;
        let params = ParameterValidator::new(&descriptor.params).validate(raw_params)?;
        let interceptors = self
            .interceptors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let invocation = Invocation {
            context,
            descriptor,
            params,
        };
        run_chain(&interceptors, &handler, &invocation)
            .await?
            .ok_or(AutodriveError::NoResult)
    }
}
