//! The execution-time capability handle passed to nodes.
//!
//! A [`NodeContext`] is cheap to clone and gives a node exactly the surface
//! it needs: its own ports (emit / close / set / get), its resolved
//! configuration, the shared globals, and the event log. Routing goes
//! through the connection registry — nodes never hold pointers to each
//! other.

use crate::connection::ConnectionManager;
use crate::context::WorkflowContext;
use crate::error::Result;
use crate::instance::NodeInstance;
use crate::logging::LogLevel;
use serde_json::Value;
use std::sync::Arc;

/// Per-node handle used inside `run`, `on_chunk`, and `initialize`.
#[derive(Clone)]
pub struct NodeContext {
    node: Arc<NodeInstance>,
    connections: Arc<ConnectionManager>,
    workflow: Arc<WorkflowContext>,
}

impl NodeContext {
    /// Create a handle for one node.
    pub fn new(
        node: Arc<NodeInstance>,
        connections: Arc<ConnectionManager>,
        workflow: Arc<WorkflowContext>,
    ) -> Self {
        Self {
            node,
            connections,
            workflow,
        }
    }

    /// The id of the node this handle belongs to.
    pub fn node_id(&self) -> &str {
        self.node.id()
    }

    /// The shared workflow context.
    pub fn workflow(&self) -> &Arc<WorkflowContext> {
        &self.workflow
    }

    // ===== streaming outputs =====

    /// Emit a chunk on a streaming output.
    ///
    /// The payload is validated against the port schema, wrapped once, and
    /// enqueued on every downstream FIFO bound to the port (one enqueue per
    /// sink, reference-shared).
    pub async fn emit(&self, port: &str, payload: Value) -> Result<()> {
        let chunk = self.node.open_output_chunk(port, payload)?;
        self.connections
            .route_chunk(self.node.id(), port, chunk)
            .await
    }

    /// Enqueue end-of-stream on a streaming output and every downstream FIFO.
    pub async fn close_output(&self, port: &str) -> Result<()> {
        self.node.close_output_port(port)?;
        self.connections.route_end(self.node.id(), port).await
    }

    // ===== value ports =====

    /// Write a value output.
    pub fn set_value(&self, port: &str, payload: Value) -> Result<()> {
        self.node.set_value(port, payload)
    }

    /// Read a value input. Fails if the cell is empty.
    pub fn get_value(&self, port: &str) -> Result<Arc<Value>> {
        self.node.get_value(port)
    }

    /// Read a value input, falling back to `Null` when empty.
    pub fn get_value_or_null(&self, port: &str) -> Value {
        self.node
            .get_value(port)
            .map(|v| v.as_ref().clone())
            .unwrap_or(Value::Null)
    }

    // ===== configuration =====

    /// The effective (resolved) configuration.
    pub fn config(&self) -> Value {
        self.node.config()
    }

    /// Look up a configuration value by dotted key.
    pub fn get_config(&self, dotted_key: &str) -> Option<Value> {
        self.node.config_value(dotted_key)
    }

    /// Look up a configuration value, falling back to a default.
    pub fn get_config_or(&self, dotted_key: &str, default: Value) -> Value {
        self.get_config(dotted_key)
            .filter(|v| !v.is_null())
            .unwrap_or(default)
    }

    /// Typed config helper: string.
    pub fn config_str(&self, dotted_key: &str) -> Option<String> {
        self.get_config(dotted_key)?
            .as_str()
            .map(|s| s.to_string())
    }

    /// Typed config helper: integer.
    pub fn config_i64(&self, dotted_key: &str) -> Option<i64> {
        self.get_config(dotted_key)?.as_i64()
    }

    /// Typed config helper: float (accepts integers).
    pub fn config_f64(&self, dotted_key: &str) -> Option<f64> {
        self.get_config(dotted_key)?.as_f64()
    }

    /// Typed config helper: boolean.
    pub fn config_bool(&self, dotted_key: &str) -> Option<bool> {
        self.get_config(dotted_key)?.as_bool()
    }

    // ===== globals =====

    /// Read a global variable by dotted path.
    pub fn global(&self, dotted_key: &str) -> Option<Value> {
        self.workflow.global(dotted_key)
    }

    /// Set a global variable by dotted path.
    pub fn set_global(&self, dotted_key: &str, value: Value) {
        self.workflow.set_global(dotted_key, value);
    }

    // ===== logging =====

    /// Log an info message scoped to this node.
    pub fn log_info(&self, message: impl Into<String>) {
        self.workflow
            .log_node(LogLevel::Info, self.node.id(), message);
    }

    /// Log a success message scoped to this node.
    pub fn log_success(&self, message: impl Into<String>) {
        self.workflow
            .log_node(LogLevel::Success, self.node.id(), message);
    }

    /// Log a warning message scoped to this node.
    pub fn log_warning(&self, message: impl Into<String>) {
        self.workflow
            .log_node(LogLevel::Warning, self.node.id(), message);
    }

    /// Log an error message scoped to this node.
    pub fn log_error(&self, message: impl Into<String>) {
        self.workflow
            .log_node(LogLevel::Error, self.node.id(), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, Endpoint};
    use crate::schema::{AtomType, PortSchema};
    use crate::traits::node::{Node, NodeDescriptor, NodeFuture};
    use serde_json::json;

    struct Source;

    impl Node for Source {
        fn descriptor(&self) -> NodeDescriptor {
            NodeDescriptor::new("source")
                .with_output("out", PortSchema::streaming_struct([("d", AtomType::String)]))
                .with_output("level", PortSchema::value(AtomType::Integer))
        }

        fn run<'a>(&'a self, _ctx: NodeContext) -> NodeFuture<'a> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    struct Sink;

    impl Node for Sink {
        fn descriptor(&self) -> NodeDescriptor {
            NodeDescriptor::new("sink")
                .with_input("in", PortSchema::streaming_struct([("d", AtomType::String)]))
        }

        fn run<'a>(&'a self, _ctx: NodeContext) -> NodeFuture<'a> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    fn wired() -> (Arc<NodeInstance>, Arc<NodeInstance>, NodeContext) {
        let source = Arc::new(NodeInstance::new(
            "src",
            None,
            json!({"greeting": "hi", "nested": {"deep": true}}),
            Arc::new(Source),
        ));
        let sink = Arc::new(NodeInstance::new("dst", None, Value::Null, Arc::new(Sink)));
        sink.allocate_fifos(8);

        let mut cm = ConnectionManager::new();
        cm.add(
            Connection::new(
                Endpoint::new("src", "out"),
                Endpoint::new("dst", "in"),
                source.output("out").unwrap().schema().clone(),
                sink.input("in").unwrap().schema().clone(),
            )
            .unwrap(),
        );
        cm.bind_sink(
            Endpoint::new("dst", "in"),
            sink.input_sender("in").unwrap(),
        );

        let workflow = Arc::new(WorkflowContext::new());
        let ctx = NodeContext::new(Arc::clone(&source), Arc::new(cm), workflow);
        (source, sink, ctx)
    }

    #[tokio::test]
    async fn emit_reaches_downstream_fifo_in_order() {
        let (_, sink, ctx) = wired();
        ctx.emit("out", json!({"d": "α"})).await.unwrap();
        ctx.emit("out", json!({"d": "β"})).await.unwrap();
        ctx.close_output("out").await.unwrap();

        let mut rx = sink.take_receiver("in").unwrap();
        let mut seen = Vec::new();
        while let Some(entry) = rx.recv().await {
            match entry {
                crate::chunk::StreamEntry::Chunk(c) => {
                    seen.push(c.payload()["d"].as_str().unwrap().to_string());
                }
                crate::chunk::StreamEntry::End => break,
            }
        }
        assert_eq!(seen, vec!["α", "β"]);
    }

    #[tokio::test]
    async fn emit_after_close_is_rejected() {
        let (_, _, ctx) = wired();
        ctx.close_output("out").await.unwrap();
        let err = ctx.emit("out", json!({"d": "late"})).await.unwrap_err();
        assert_eq!(err.code(), "E203");
    }

    #[test]
    fn config_helpers_read_dotted_keys() {
        let (_, _, ctx) = wired();
        assert_eq!(ctx.config_str("greeting").as_deref(), Some("hi"));
        assert_eq!(ctx.config_bool("nested.deep"), Some(true));
        assert_eq!(ctx.get_config_or("missing", json!(5)), json!(5));
    }

    #[test]
    fn globals_and_logging_are_scoped() {
        let (_, _, ctx) = wired();
        ctx.set_global("session.user", json!("ada"));
        assert_eq!(ctx.global("session.user"), Some(json!("ada")));

        ctx.log_warning("watch out");
        let events = ctx.workflow().events();
        assert_eq!(events[0].node_id.as_deref(), Some("src"));
    }
}
