use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{float_param, str_param};
use crate::command::{
    CommandBus, CommandContextRef, CommandDescriptor, CommandModule, CommandResult, HandlerOutput,
    ParameterSpec, ParameterType,
};
use crate::vision::{load_image_bytes, VisionProvider};
use crate::AutodriveError;

const DEFAULT_THRESHOLD: f64 = 0.8;
const SIMILAR_AT: f64 = 0.9;

pub struct VisionCommandModule {
    vision: Arc<dyn VisionProvider>,
}

impl VisionCommandModule {
    pub fn new(vision: Arc<dyn VisionProvider>) -> Self {
        Self { vision }
    }
}

fn image_param<'a>(params: &'a Map<String, Value>, name: &str) -> Result<&'a Value, AutodriveError> {
    params
        .get(name)
        .ok_or_else(|| AutodriveError::invalid(name, "missing parameter"))
}

async fn store_template(vision: Arc<dyn VisionProvider>, p: Map<String, Value>) -> HandlerOutput {
    let id = str_param(&p, "template_id")?;
    let bytes = load_image_bytes(image_param(&p, "image")?).await?;
    let size = bytes.len();
    vision.store_template(id, bytes).await?;
    Ok(Some(CommandResult::success_with_message(
        json!({"template_id": id, "bytes": size, "cached": vision.template_count()}),
        format!("template '{}' stored", id),
    )))
}

async fn find_template(
    vision: Arc<dyn VisionProvider>,
    ctx: CommandContextRef,
    p: Map<String, Value>,
) -> HandlerOutput {
    let id = str_param(&p, "template_id")?;
    let threshold = float_param(&p, "threshold")?;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(AutodriveError::invalid("threshold", "must be within [0, 1]"));
    }
    ctx.report_progress("find_template", "matching template", None, None);
    let found = vision.find_template(id, threshold).await?;
    let payload = match found {
        Some(m) => {
            ctx.report_progress(
                "find_template",
                "template matched",
                Some(100),
                Some(json!({"x": m.x, "y": m.y})),
            );
            json!({"found": true, "x": m.x, "y": m.y, "score": m.score})
        }
        None => {
            ctx.report_progress("find_template", "template not found", None, None);
            json!({"found": false})
        }
    };
    Ok(Some(CommandResult::success(payload)))
}

async fn compare_images(vision: Arc<dyn VisionProvider>, p: Map<String, Value>) -> HandlerOutput {
    let first = load_image_bytes(image_param(&p, "image1")?).await?;
    let second = load_image_bytes(image_param(&p, "image2")?).await?;
    let similarity = vision.compare_images(&first, &second).await?;
    Ok(Some(CommandResult::success(json!({
        "similarity": similarity,
        "is_similar": similarity >= SIMILAR_AT,
    }))))
}

impl CommandModule for VisionCommandModule {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn register(&self, bus: &CommandBus) {
        let vision = Arc::clone(&self.vision);
        bus.register_fn(
            CommandDescriptor::new("store_template")
                .describe("Cache a template image for later matching")
                .param(ParameterSpec::new("template_id", ParameterType::String).required())
                .param(ParameterSpec::new("image", ParameterType::Image).required()),
            move |_ctx, p| store_template(Arc::clone(&vision), p),
        );

        let vision = Arc::clone(&self.vision);
        bus.register_fn(
            CommandDescriptor::new("find_template")
                .describe("Locate a cached template on screen")
                .param(ParameterSpec::new("template_id", ParameterType::String).required())
                .param(
                    ParameterSpec::new("threshold", ParameterType::Number)
                        .with_default(DEFAULT_THRESHOLD)
                        .describe("Match threshold (0-1)"),
                ),
            move |ctx, p| find_template(Arc::clone(&vision), ctx, p),
        );

        let vision = Arc::clone(&self.vision);
        bus.register_fn(
            CommandDescriptor::new("compare_images")
                .describe("Similarity of two images")
                .param(ParameterSpec::new("image1", ParameterType::Image).required())
                .param(ParameterSpec::new("image2", ParameterType::Image).required()),
            move |_ctx, p| compare_images(Arc::clone(&vision), p),
        );

        let vision = Arc::clone(&self.vision);
        bus.register_fn(
            CommandDescriptor::new("clear_templates").describe("Drop every cached template"),
            move |_ctx, _p| {
                let vision = Arc::clone(&vision);
                async move {
                    let dropped = vision.template_count();
                    vision.clear_templates();
                    Ok(Some(CommandResult::success_with_message(
                        json!({"cleared": dropped}),
                        "templates cleared",
                    )))
                }
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LocalContext;
    use crate::vision::TemplateCache;
    use pretty_assertions::assert_eq;

    fn setup() -> (CommandBus, Arc<TemplateCache>) {
        let cache = Arc::new(TemplateCache::new());
        let bus = CommandBus::new();
        VisionCommandModule::new(cache.clone()).register(&bus);
        (bus, cache)
    }

    async fn run(bus: &CommandBus, action: &str, params: Value) -> Result<CommandResult, AutodriveError> {
        bus.dispatch(Arc::new(LocalContext::new(action, params.clone())), action, &params)
            .await
    }

    #[tokio::test]
    async fn test_store_then_find_without_matcher() {
        let (bus, cache) = setup();
        run(&bus, "store_template", json!({"template_id": "ok", "image": "AQID"}))
            .await
            .unwrap();
        assert_eq!(cache.template_count(), 1);

        let r = run(&bus, "find_template", json!({"template_id": "ok"})).await.unwrap();
        assert_eq!(r.payload, Some(json!({"found": false})));

        run(&bus, "clear_templates", json!({})).await.unwrap();
        assert_eq!(cache.template_count(), 0);
    }

    #[tokio::test]
    async fn test_compare_identical_images() {
        let (bus, _) = setup();
        let r = run(&bus, "compare_images", json!({"image1": "AQID", "image2": "AQID"}))
            .await
            .unwrap();
        assert_eq!(r.payload, Some(json!({"similarity": 1.0, "is_similar": true})));
    }

    #[tokio::test]
    async fn test_threshold_out_of_range() {
        let (bus, _) = setup();
        let err = run(&bus, "find_template", json!({"template_id": "x", "threshold": 3}))
            .await
            .unwrap_err();
        assert!(matches!(err, AutodriveError::InvalidParameter { .. }));
    }
}
