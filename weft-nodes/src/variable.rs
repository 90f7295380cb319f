//! Global variable publisher node.

use serde_json::{Map, Value};
use std::sync::Arc;
use weft_core::error::Result;
use weft_core::registry::NodeFactory;
use weft_core::traits::{Node, NodeContext, NodeDescriptor, NodeFuture};

/// Publishes its configuration map into the workflow globals.
///
/// Every key/value pair in `config` becomes a global variable during
/// initialization, before any node runs — the usual way to seed values
/// templates refer to.
///
/// ```yaml
/// nodes:
///   - id: env
///     type: variable
///     config:
///       base_url: "https://api.example.com"
///       retries: 3
/// ```
pub struct VariableNode;

impl VariableNode {
    fn entries(config: &Value) -> Map<String, Value> {
        config.as_object().cloned().unwrap_or_default()
    }
}

impl Node for VariableNode {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("variable")
            .with_description("Sets workflow globals from its configuration")
    }

    fn initialize<'a>(&'a self, ctx: NodeContext) -> NodeFuture<'a, ()> {
        Box::pin(async move {
            let entries = Self::entries(&ctx.config());
            for (key, value) in &entries {
                ctx.set_global(key, value.clone());
            }
            if !entries.is_empty() {
                ctx.log_info(format!("published {} global(s)", entries.len()));
            }
            Ok(())
        })
    }

    fn run<'a>(&'a self, ctx: NodeContext) -> NodeFuture<'a> {
        Box::pin(async move {
            // Globals were published at initialize; re-publish with the
            // resolved config so templated values land too.
            let entries = Self::entries(&ctx.config());
            for (key, value) in &entries {
                ctx.set_global(key, value.clone());
            }
            Ok(Value::Object(Map::new()))
        })
    }
}

/// Factory for [`VariableNode`].
pub struct VariableFactory;

impl NodeFactory for VariableFactory {
    fn type_name(&self) -> &str {
        "variable"
    }

    fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(VariableNode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::connection::ConnectionManager;
    use weft_core::context::WorkflowContext;
    use weft_core::instance::NodeInstance;

    #[tokio::test]
    async fn publishes_config_as_globals() {
        let node = Arc::new(NodeInstance::new(
            "env",
            None,
            json!({"base_url": "https://x", "retries": 3}),
            Arc::new(VariableNode),
        ));
        let workflow = Arc::new(WorkflowContext::new());
        let ctx = NodeContext::new(
            Arc::clone(&node),
            Arc::new(ConnectionManager::new()),
            Arc::clone(&workflow),
        );

        VariableNode.initialize(ctx.clone()).await.unwrap();
        assert_eq!(workflow.global("base_url"), Some(json!("https://x")));
        assert_eq!(workflow.global("retries"), Some(json!(3)));

        VariableNode.run(ctx).await.unwrap();
        assert_eq!(workflow.global("retries"), Some(json!(3)));
    }
}
