//! Stream-collecting sink node.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use weft_core::chunk::Chunk;
use weft_core::error::Result;
use weft_core::registry::NodeFactory;
use weft_core::schema::{AtomType, PortSchema};
use weft_core::traits::{ExecutionMode, Node, NodeContext, NodeDescriptor, NodeFuture};

/// Buffers incoming chunk payloads and publishes them to a global.
///
/// Every received payload is appended to an in-memory list mirrored to the
/// global named by `global_key` (default `collected.<node_id>`), so other
/// nodes and the caller can read the stream's history from the context.
pub struct CollectNode {
    seen: Mutex<Vec<Value>>,
}

impl CollectNode {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }

    fn global_key(ctx: &NodeContext) -> String {
        ctx.config_str("global_key")
            .unwrap_or_else(|| format!("collected.{}", ctx.node_id()))
    }
}

impl Default for CollectNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for CollectNode {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("collect")
            .with_mode(ExecutionMode::Streaming)
            .with_description("Buffers a stream into a global variable")
            .with_input("in", PortSchema::streaming(AtomType::Any))
    }

    fn initialize<'a>(&'a self, _ctx: NodeContext) -> NodeFuture<'a, ()> {
        Box::pin(async move {
            self.seen.lock().clear();
            Ok(())
        })
    }

    fn run<'a>(&'a self, _ctx: NodeContext) -> NodeFuture<'a> {
        Box::pin(async { Ok(Value::Null) })
    }

    fn on_chunk<'a>(
        &'a self,
        ctx: NodeContext,
        _port: &'a str,
        chunk: Arc<Chunk>,
    ) -> NodeFuture<'a, ()> {
        Box::pin(async move {
            let snapshot = {
                let mut seen = self.seen.lock();
                seen.push(chunk.payload().as_ref().clone());
                seen.clone()
            };
            ctx.set_global(&Self::global_key(&ctx), Value::Array(snapshot));
            Ok(())
        })
    }
}

/// Factory for [`CollectNode`].
pub struct CollectFactory;

impl NodeFactory for CollectFactory {
    fn type_name(&self) -> &str {
        "collect"
    }

    fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(CollectNode::new()))
    }
}
