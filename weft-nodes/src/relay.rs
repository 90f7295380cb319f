//! Stream pass-through node.

use serde_json::Value;
use std::sync::Arc;
use weft_core::chunk::Chunk;
use weft_core::error::Result;
use weft_core::registry::NodeFactory;
use weft_core::schema::{AtomType, PortSchema};
use weft_core::traits::{ExecutionMode, Node, NodeContext, NodeDescriptor, NodeFuture};

/// Forwards every chunk from its input to its output.
///
/// The minimal streaming transform: useful as a tap point, a fan-out hub,
/// or a template for chunk-rewriting nodes.
pub struct RelayNode;

impl Node for RelayNode {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("relay")
            .with_mode(ExecutionMode::Streaming)
            .with_description("Forwards chunks from input to output")
            .with_input("in", PortSchema::streaming(AtomType::Any))
            .with_output("out", PortSchema::streaming(AtomType::Any))
    }

    fn run<'a>(&'a self, _ctx: NodeContext) -> NodeFuture<'a> {
        // All the work happens chunk-by-chunk in the consumer task.
        Box::pin(async { Ok(Value::Null) })
    }

    fn on_chunk<'a>(
        &'a self,
        ctx: NodeContext,
        _port: &'a str,
        chunk: Arc<Chunk>,
    ) -> NodeFuture<'a, ()> {
        Box::pin(async move {
            ctx.emit("out", chunk.payload().as_ref().clone()).await
        })
    }
}

/// Factory for [`RelayNode`].
pub struct RelayFactory;

impl NodeFactory for RelayFactory {
    fn type_name(&self) -> &str {
        "relay"
    }

    fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(RelayNode))
    }
}
