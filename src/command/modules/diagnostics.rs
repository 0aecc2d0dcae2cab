use std::sync::{Arc, Weak};

use serde_json::json;

use crate::command::{CommandBus, CommandDescriptor, CommandModule, CommandResult};
use crate::device::DeviceInfo;
use crate::perception::PerceptionProvider;

/// Introspection: hierarchy dumps and device identity.
pub struct DiagnosticsCommandModule {
    perception: Arc<dyn PerceptionProvider>,
    info: DeviceInfo,
    bus: Weak<CommandBus>,
}

impl DiagnosticsCommandModule {
    /// `bus` is only used to count registered actions; it is held weakly so
    /// the bus can own this module's handlers.
    pub fn new(
        perception: Arc<dyn PerceptionProvider>,
        info: DeviceInfo,
        bus: &Arc<CommandBus>,
    ) -> Self {
        Self {
            perception,
            info,
            bus: Arc::downgrade(bus),
        }
    }
}

impl CommandModule for DiagnosticsCommandModule {
    fn name(&self) -> &'static str {
        "diagnostics"
    }

    fn register(&self, bus: &CommandBus) {
        let perception = Arc::clone(&self.perception);
        bus.register_fn(
            CommandDescriptor::new("dump_hierarchy").describe("Dump the current UI hierarchy"),
            move |ctx, _p| {
                let perception = Arc::clone(&perception);
                async move {
                    ctx.report_progress("dump_hierarchy", "capturing hierarchy", None, None);
                    let snapshot = perception.capture().await?;
                    ctx.report_progress("dump_hierarchy", "hierarchy captured", Some(100), None);
                    Ok(Some(CommandResult::success(json!({
                        "node_count": snapshot.len(),
                        "hierarchy": snapshot.to_tree(),
                    }))))
                }
            },
        );

        let info = self.info.clone();
        let registry = self.bus.clone();
        bus.register_fn(
            CommandDescriptor::new("device_info").describe("Device identity and registered actions"),
            move |ctx, _p| {
                let info = info.clone();
                let action_count = registry.upgrade().map(|b| b.len()).unwrap_or(0);
                async move {
                    Ok(Some(CommandResult::success(json!({
                        "device_name": info.device_name,
                        "device_model": info.device_model,
                        "os_version": info.os_version,
                        "device_id": ctx.device_id(),
                        "action_count": action_count,
                    }))))
                }
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LocalContext;
    use crate::perception::{NodeAttributes, Snapshot, StaticPerception, UiElement};

    fn tree() -> Snapshot {
        let child = UiElement {
            attributes: NodeAttributes {
                text: Some("OK".into()),
                ..Default::default()
            },
            children: vec![],
        };
        Snapshot::from_root(UiElement {
            attributes: NodeAttributes::default(),
            children: vec![child],
        })
    }

    #[tokio::test]
    async fn test_dump_and_info() {
        let bus = Arc::new(CommandBus::new());
        let perception = Arc::new(StaticPerception::new(tree()));
        DiagnosticsCommandModule::new(perception, DeviceInfo::new("bench", "emu"), &bus)
            .register(&bus);

        let ctx = Arc::new(LocalContext::new("dump_hierarchy", json!({})));
        let dump = bus.dispatch(ctx.clone(), "dump_hierarchy", &json!({})).await.unwrap();
        let payload = dump.payload.unwrap();
        assert_eq!(payload["node_count"], 2);
        assert_eq!(payload["hierarchy"]["children"][0]["text"], "OK");
        assert_eq!(ctx.stages(), vec!["dump_hierarchy", "dump_hierarchy"]);

        let ctx = Arc::new(LocalContext::new("device_info", json!({})).with_device_id("dev-1"));
        let info = bus.dispatch(ctx, "device_info", &json!({})).await.unwrap();
        let payload = info.payload.unwrap();
        assert_eq!(payload["device_id"], "dev-1");
        assert_eq!(payload["action_count"], 2);
    }
}
