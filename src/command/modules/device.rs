use std::sync::Arc;

use serde_json::{Map, Value};

use super::{coord, int_param, str_param};
use crate::command::{
    CommandBus, CommandContextRef, CommandDescriptor, CommandModule, CommandResult, HandlerOutput,
    ParameterSpec, ParameterType,
};
use crate::device::{DeviceActions, KEYCODE_HOME};
use crate::AutodriveError;

/// Direct input primitives: taps, swipes, keys, text.
pub struct DeviceInteractionModule {
    device: Arc<dyn DeviceActions>,
}

impl DeviceInteractionModule {
    pub fn new(device: Arc<dyn DeviceActions>) -> Self {
        Self { device }
    }
}

fn ensure_active(ctx: &CommandContextRef) -> Result<(), AutodriveError> {
    if ctx.cancellation().is_cancelled() {
        return Err(AutodriveError::Cancelled);
    }
    Ok(())
}

async fn click(device: Arc<dyn DeviceActions>, ctx: CommandContextRef, p: Map<String, Value>) -> HandlerOutput {
    ensure_active(&ctx)?;
    let (x, y) = (coord(&p, "x")?, coord(&p, "y")?);
    device.click(x, y).await?;
    Ok(Some(CommandResult::success_message(format!("clicked ({}, {})", x, y))))
}

async fn swipe(device: Arc<dyn DeviceActions>, ctx: CommandContextRef, p: Map<String, Value>) -> HandlerOutput {
    ensure_active(&ctx)?;
    let start = (coord(&p, "startX")?, coord(&p, "startY")?);
    let end = (coord(&p, "endX")?, coord(&p, "endY")?);
    let steps = u32::try_from(int_param(&p, "steps")?.max(1)).unwrap_or(u32::MAX);
    device.swipe(start, end, steps).await?;
    Ok(Some(CommandResult::success_message(format!(
        "swiped ({},{}) -> ({},{})",
        start.0, start.1, end.0, end.1
    ))))
}

async fn press_key(device: Arc<dyn DeviceActions>, ctx: CommandContextRef, p: Map<String, Value>) -> HandlerOutput {
    ensure_active(&ctx)?;
    let keycode = coord(&p, "keycode")?;
    device.press_key(keycode).await?;
    Ok(Some(CommandResult::success_message(format!("pressed key {}", keycode))))
}

async fn input_text(device: Arc<dyn DeviceActions>, ctx: CommandContextRef, p: Map<String, Value>) -> HandlerOutput {
    ensure_active(&ctx)?;
    let text = str_param(&p, "text")?;
    device.input_text(text).await?;
    Ok(Some(CommandResult::success_message(format!(
        "entered {} characters",
        text.chars().count()
    ))))
}

impl CommandModule for DeviceInteractionModule {
    fn name(&self) -> &'static str {
        "device"
    }

    fn register(&self, bus: &CommandBus) {
        let device = Arc::clone(&self.device);
        bus.register_fn(
            CommandDescriptor::new("click")
                .describe("Tap a screen coordinate")
                .param(ParameterSpec::new("x", ParameterType::Int).required().with_default(0))
                .param(ParameterSpec::new("y", ParameterType::Int).required().with_default(0)),
            move |ctx, p| click(Arc::clone(&device), ctx, p),
        );

        let device = Arc::clone(&self.device);
        bus.register_fn(
            CommandDescriptor::new("swipe")
                .describe("Swipe between two screen coordinates")
                .params(["startX", "startY", "endX", "endY"].map(|name| {
                    ParameterSpec::new(name, ParameterType::Int)
                        .required()
                        .with_default(0)
                }))
                .param(
                    ParameterSpec::new("steps", ParameterType::Int)
                        .with_default(50)
                        .describe("Interpolation steps"),
                ),
            move |ctx, p| swipe(Arc::clone(&device), ctx, p),
        );

        let device = Arc::clone(&self.device);
        bus.register_fn(
            CommandDescriptor::new("press_key")
                .describe("Press a key by keycode")
                .param(
                    ParameterSpec::new("keycode", ParameterType::Int)
                        .required()
                        .with_default(KEYCODE_HOME),
                ),
            move |ctx, p| press_key(Arc::clone(&device), ctx, p),
        );

        let device = Arc::clone(&self.device);
        bus.register_fn(
            CommandDescriptor::new("press_back").describe("Press the back key"),
            move |ctx, _p| {
                let device = Arc::clone(&device);
                async move {
                    ensure_active(&ctx)?;
                    device.press_back().await?;
                    Ok(Some(CommandResult::success_message("pressed back")))
                }
            },
        );

        let device = Arc::clone(&self.device);
        bus.register_fn(
            CommandDescriptor::new("press_home").describe("Press the home key"),
            move |ctx, _p| {
                let device = Arc::clone(&device);
                async move {
                    ensure_active(&ctx)?;
                    device.press_home().await?;
                    Ok(Some(CommandResult::success_message("pressed home")))
                }
            },
        );

        let device = Arc::clone(&self.device);
        bus.register_fn(
            CommandDescriptor::new("input_text")
                .describe("Type text into the focused field")
                .param(ParameterSpec::new("text", ParameterType::String).required().allow_blank()),
            move |ctx, p| input_text(Arc::clone(&device), ctx, p),
        );
    }
}
