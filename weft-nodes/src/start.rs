//! Workflow entry point node.

use serde_json::{json, Value};
use std::sync::Arc;
use weft_core::error::Result;
use weft_core::registry::NodeFactory;
use weft_core::schema::{AtomType, PortSchema};
use weft_core::traits::{Node, NodeContext, NodeDescriptor, NodeFuture};

/// Seeds a workflow with initial data.
///
/// Data comes from the node config, a named global variable, or the
/// optional `initial_data` input — the input wins when set.
///
/// ```yaml
/// nodes:
///   - id: entry
///     type: start
///     config:
///       data: { session: demo }
/// ```
pub struct StartNode;

impl Node for StartNode {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("start")
            .with_description("Provides initial data at the head of a workflow")
            .with_input(
                "initial_data",
                PortSchema::value_struct([("data", AtomType::Any), ("global_var", AtomType::String)]),
            )
            .with_output(
                "output",
                PortSchema::value_struct([
                    ("data", AtomType::Any),
                    ("source", AtomType::String),
                    ("global_var", AtomType::Any),
                ]),
            )
    }

    fn run<'a>(&'a self, ctx: NodeContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let mut data = ctx.get_config_or("data", json!({}));
            let mut global_var = ctx.config_str("global_var");
            let mut source = "config";

            if let Ok(input) = ctx.get_value("initial_data") {
                if let Some(key) = input.get("global_var").and_then(|v| v.as_str()) {
                    global_var = Some(key.to_string());
                }
                match input.get("data") {
                    Some(v) if !v.is_null() => {
                        data = v.clone();
                        source = "input";
                    }
                    _ => {}
                }
            }

            if source != "input" {
                if let Some(key) = &global_var {
                    if let Some(value) = ctx.global(key) {
                        data = value;
                        source = "global_var";
                    }
                }
            }

            let output = json!({
                "data": data,
                "source": source,
                "global_var": global_var,
            });
            ctx.set_value("output", output.clone())?;
            ctx.log_info(format!("seeded from {source}"));
            Ok(output)
        })
    }
}

/// Factory for [`StartNode`].
pub struct StartFactory;

impl NodeFactory for StartFactory {
    fn type_name(&self) -> &str {
        "start"
    }

    fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(StartNode))
    }
}
