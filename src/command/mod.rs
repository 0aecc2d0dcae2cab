//! Command dispatch pipeline: descriptors, parameter normalization,
//! interceptors and the bus tying them together.

mod bus;
mod context;
mod descriptor;
mod handler;
mod interceptor;
mod result;
mod validator;

pub mod modules;

pub use bus::CommandBus;
pub use context::{CommandContext, CommandContextRef, LocalContext, LogLevel, ReportedEvent};
pub use descriptor::{
    CommandDescriptor, MetadataSupplier, ParameterConstraints, ParameterSpec, ParameterType,
};
pub use handler::{CommandHandler, CommandHandlerRef, HandlerOutput};
pub use interceptor::{CommandInterceptor, Invocation, LoggingInterceptor, Next};
pub use result::CommandResult;
pub use validator::ParameterValidator;

/// A group of related actions registered together.
pub trait CommandModule: Send + Sync {
    fn name(&self) -> &'static str;

    fn register(&self, bus: &CommandBus);
}
