//! Runtime pairing of a node behavior with its port state.
//!
//! The engine owns one [`NodeInstance`] per node in the workflow. The
//! instance carries the identity, raw and resolved configuration, lifecycle
//! status, and the port instances built from the behavior's declarations.

use crate::chunk::{Chunk, StreamEntry};
use crate::error::{Result, WeftError};
use crate::port::{InputPort, OutputPort};
use crate::traits::node::{ExecutionMode, Node, NodeDescriptor, NodeStatus};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// A node bound into a workflow: behavior + ports + lifecycle state.
pub struct NodeInstance {
    id: String,
    display_name: String,
    descriptor: NodeDescriptor,
    behavior: Arc<dyn Node>,
    inputs: HashMap<String, InputPort>,
    outputs: HashMap<String, OutputPort>,
    raw_config: Value,
    resolved_config: RwLock<Option<Value>>,
    status: Mutex<NodeStatus>,
    value_ready: Notify,
}

impl NodeInstance {
    /// Build an instance from a behavior, creating port instances from its
    /// declarations.
    pub fn new(
        id: impl Into<String>,
        display_name: Option<String>,
        raw_config: Value,
        behavior: Arc<dyn Node>,
    ) -> Self {
        let id = id.into();
        let descriptor = behavior.descriptor();
        let inputs = descriptor
            .inputs
            .iter()
            .map(|decl| {
                (
                    decl.name.clone(),
                    InputPort::new(decl.name.clone(), decl.schema.clone()),
                )
            })
            .collect();
        let outputs = descriptor
            .outputs
            .iter()
            .map(|decl| {
                (
                    decl.name.clone(),
                    OutputPort::new(decl.name.clone(), decl.schema.clone()),
                )
            })
            .collect();
        Self {
            display_name: display_name.unwrap_or_else(|| id.clone()),
            id,
            descriptor,
            behavior,
            inputs,
            outputs,
            raw_config,
            resolved_config: RwLock::new(None),
            status: Mutex::new(NodeStatus::Pending),
            value_ready: Notify::new(),
        }
    }

    /// Node id, unique per workflow.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name (defaults to the id).
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Registered type name.
    pub fn type_name(&self) -> &str {
        &self.descriptor.type_name
    }

    /// Declared execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.descriptor.mode
    }

    /// The behavior implementation.
    pub fn behavior(&self) -> &Arc<dyn Node> {
        &self.behavior
    }

    /// The declaration this instance was built from.
    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    // ===== lifecycle =====

    /// Current lifecycle status.
    pub fn status(&self) -> NodeStatus {
        *self.status.lock()
    }

    /// Transition the status. Transitions are monotonic: an attempt to move
    /// backwards (or out of a terminal state) is ignored and returns `false`.
    pub fn set_status(&self, next: NodeStatus) -> bool {
        let mut status = self.status.lock();
        if next.rank() > status.rank() {
            *status = next;
            true
        } else {
            false
        }
    }

    // ===== configuration =====

    /// The raw configuration from the workflow description.
    pub fn raw_config(&self) -> &Value {
        &self.raw_config
    }

    /// Store the rendered configuration, used from here on by `config`.
    pub fn set_resolved_config(&self, config: Value) {
        *self.resolved_config.write() = Some(config);
    }

    /// The effective configuration: resolved if rendered, raw otherwise.
    pub fn config(&self) -> Value {
        self.resolved_config
            .read()
            .clone()
            .unwrap_or_else(|| self.raw_config.clone())
    }

    /// Look up a configuration value by dotted key.
    pub fn config_value(&self, dotted_key: &str) -> Option<Value> {
        let config = self.resolved_config.read();
        let mut current: &Value = match config.as_ref() {
            Some(resolved) => resolved,
            None => &self.raw_config,
        };
        for segment in dotted_key.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }

    // ===== ports =====

    /// Get an input port instance.
    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.get(name)
    }

    /// Get an output port instance.
    pub fn output(&self, name: &str) -> Option<&OutputPort> {
        self.outputs.get(name)
    }

    /// Names of all streaming input ports, in declaration order.
    pub fn streaming_input_names(&self) -> Vec<String> {
        self.descriptor
            .inputs
            .iter()
            .filter(|d| d.schema.is_streaming())
            .map(|d| d.name.clone())
            .collect()
    }

    /// Allocate FIFOs for all streaming inputs. Must run before the
    /// scheduler launches this node's consumers.
    pub fn allocate_fifos(&self, capacity: usize) {
        for port in self.inputs.values() {
            if let Some(fifo) = port.fifo() {
                fifo.allocate(capacity);
            }
        }
    }

    /// Claim the consumer handle for a streaming input FIFO.
    pub fn take_receiver(&self, port: &str) -> Option<mpsc::Receiver<StreamEntry>> {
        self.inputs.get(port)?.fifo()?.take_receiver()
    }

    /// The producer handle for a streaming input FIFO, if allocated.
    pub fn input_sender(&self, port: &str) -> Option<mpsc::Sender<StreamEntry>> {
        self.inputs.get(port)?.fifo()?.sender()
    }

    // ===== value ports =====

    /// Write a value output. Notifies readiness watchers (hybrid nodes
    /// signal "ready" by writing every declared value output).
    pub fn set_value(&self, port: &str, payload: Value) -> Result<()> {
        let out = self.output(port).ok_or_else(|| self.unknown_output(port))?;
        let cell = out.cell().ok_or_else(|| WeftError::Validation {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: "port is streaming; use emit".to_string(),
        })?;
        out.schema().validate_for(&payload, &self.id, port)?;
        cell.set(Arc::new(payload));
        self.value_ready.notify_waiters();
        Ok(())
    }

    /// Read a value input. Fails if the cell is empty.
    pub fn get_value(&self, port: &str) -> Result<Arc<Value>> {
        let input = self.input(port).ok_or_else(|| self.unknown_input(port))?;
        let cell = input.cell().ok_or_else(|| WeftError::Validation {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: "port is streaming; consume chunks instead".to_string(),
        })?;
        cell.get().ok_or_else(|| WeftError::PortEmpty {
            node_id: self.id.clone(),
            port: port.to_string(),
        })
    }

    /// Peek a value output without consuming it (scheduler propagation).
    pub fn output_value(&self, port: &str) -> Option<Arc<Value>> {
        self.outputs.get(port)?.cell()?.peek()
    }

    /// Set a value input cell to a shared payload (scheduler propagation and
    /// external injection). The payload is validated against the port schema.
    pub fn set_input_value(&self, port: &str, payload: Arc<Value>) -> Result<()> {
        let input = self.input(port).ok_or_else(|| self.unknown_input(port))?;
        let cell = input.cell().ok_or_else(|| WeftError::Validation {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: "port is streaming; use feed".to_string(),
        })?;
        input.schema().validate_for(&payload, &self.id, port)?;
        cell.set(payload);
        Ok(())
    }

    /// Check whether every declared value output has been written.
    ///
    /// Nodes without value outputs are trivially ready.
    pub fn value_outputs_ready(&self) -> bool {
        self.outputs
            .values()
            .filter_map(|p| p.cell())
            .all(|cell| cell.is_set())
    }

    /// Notifier fired on every value-output write.
    pub fn value_ready(&self) -> &Notify {
        &self.value_ready
    }

    // ===== streaming ports =====

    /// Validate a payload against a streaming output and wrap it as a chunk.
    /// Fails once the output has been closed.
    pub fn open_output_chunk(&self, port: &str, payload: Value) -> Result<Arc<Chunk>> {
        let out = self.output(port).ok_or_else(|| self.unknown_output(port))?;
        if !out.is_streaming() {
            return Err(WeftError::Validation {
                node_id: self.id.clone(),
                port: port.to_string(),
                cause: "port is not streaming; use set_value".to_string(),
            });
        }
        if out.is_stream_closed() {
            return Err(WeftError::StreamClosed {
                node_id: self.id.clone(),
                port: port.to_string(),
            });
        }
        Ok(Arc::new(Chunk::new(
            payload,
            out.schema().clone(),
            &self.id,
            port,
        )?))
    }

    /// Mark a streaming output closed. Fails on a second close.
    pub fn close_output_port(&self, port: &str) -> Result<()> {
        let out = self.output(port).ok_or_else(|| self.unknown_output(port))?;
        if !out.is_streaming() {
            return Err(WeftError::Validation {
                node_id: self.id.clone(),
                port: port.to_string(),
                cause: "port is not streaming".to_string(),
            });
        }
        if !out.close_stream() {
            return Err(WeftError::StreamClosed {
                node_id: self.id.clone(),
                port: port.to_string(),
            });
        }
        Ok(())
    }

    /// Enqueue a payload on a streaming input (external producer contract).
    ///
    /// Awaits FIFO space when the high-water mark is reached.
    pub async fn feed(&self, port: &str, payload: Value) -> Result<()> {
        let input = self.input(port).ok_or_else(|| self.unknown_input(port))?;
        let fifo = input.fifo().ok_or_else(|| WeftError::Validation {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: "port is not streaming; use set_input_value".to_string(),
        })?;
        if fifo.is_closed() {
            return Err(WeftError::StreamClosed {
                node_id: self.id.clone(),
                port: port.to_string(),
            });
        }
        let sender = fifo.sender().ok_or_else(|| WeftError::Validation {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: "stream FIFO not allocated; the node has not been initialized".to_string(),
        })?;
        let chunk = Arc::new(Chunk::new(
            payload,
            input.schema().clone(),
            &self.id,
            port,
        )?);
        sender
            .send(StreamEntry::Chunk(chunk))
            .await
            .map_err(|_| WeftError::StreamClosed {
                node_id: self.id.clone(),
                port: port.to_string(),
            })
    }

    /// Enqueue end-of-stream on a streaming input. At most one EOS may enter
    /// a FIFO; a second close fails.
    pub async fn close_input(&self, port: &str) -> Result<()> {
        let input = self.input(port).ok_or_else(|| self.unknown_input(port))?;
        let fifo = input.fifo().ok_or_else(|| WeftError::Validation {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: "port is not streaming".to_string(),
        })?;
        let sender = fifo.sender().ok_or_else(|| WeftError::Validation {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: "stream FIFO not allocated; the node has not been initialized".to_string(),
        })?;
        if !fifo.close() {
            return Err(WeftError::StreamClosed {
                node_id: self.id.clone(),
                port: port.to_string(),
            });
        }
        sender
            .send(StreamEntry::End)
            .await
            .map_err(|_| WeftError::StreamClosed {
                node_id: self.id.clone(),
                port: port.to_string(),
            })
    }

    fn unknown_input(&self, port: &str) -> WeftError {
        WeftError::UnknownEndpoint {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: format!(
                "no input port named '{port}'; available: {:?}",
                self.descriptor
                    .inputs
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
            ),
        }
    }

    fn unknown_output(&self, port: &str) -> WeftError {
        WeftError::UnknownEndpoint {
            node_id: self.id.clone(),
            port: port.to_string(),
            cause: format!(
                "no output port named '{port}'; available: {:?}",
                self.descriptor
                    .outputs
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
            ),
        }
    }
}

impl std::fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInstance")
            .field("id", &self.id)
            .field("type", &self.descriptor.type_name)
            .field("mode", &self.descriptor.mode)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AtomType, PortSchema};
    use crate::traits::context::NodeContext;
    use crate::traits::node::{NodeDescriptor, NodeFuture};
    use serde_json::json;

    struct Probe;

    impl Node for Probe {
        fn descriptor(&self) -> NodeDescriptor {
            NodeDescriptor::new("probe")
                .with_input("in", PortSchema::value_struct([("v", AtomType::Integer)]))
                .with_input("stream_in", PortSchema::streaming(AtomType::String))
                .with_output("out", PortSchema::value_struct([("v", AtomType::Integer)]))
                .with_output("stream_out", PortSchema::streaming(AtomType::String))
        }

        fn run<'a>(&'a self, _ctx: NodeContext) -> NodeFuture<'a> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    fn probe(id: &str) -> NodeInstance {
        NodeInstance::new(id, None, Value::Null, Arc::new(Probe))
    }

    #[test]
    fn ports_are_built_from_declarations() {
        let node = probe("p");
        assert!(node.input("in").is_some());
        assert!(node.input("stream_in").is_some());
        assert!(node.output("out").is_some());
        assert!(node.input("nope").is_none());
        assert_eq!(node.streaming_input_names(), vec!["stream_in"]);
        assert_eq!(node.display_name(), "p");
    }

    #[test]
    fn status_transitions_are_monotonic() {
        let node = probe("p");
        assert_eq!(node.status(), NodeStatus::Pending);
        assert!(node.set_status(NodeStatus::Running));
        assert!(node.set_status(NodeStatus::Succeeded));
        assert!(!node.set_status(NodeStatus::Running));
        assert!(!node.set_status(NodeStatus::Failed));
        assert_eq!(node.status(), NodeStatus::Succeeded);
    }

    #[test]
    fn value_round_trip_and_validation() {
        let node = probe("p");
        node.set_value("out", json!({"v": 1})).unwrap();
        assert_eq!(*node.output_value("out").unwrap(), json!({"v": 1}));

        let err = node.set_value("out", json!({"v": "one"})).unwrap_err();
        assert_eq!(err.code(), "E201");

        let err = node.set_value("stream_out", json!("x")).unwrap_err();
        assert!(err.to_string().contains("use emit"));

        let err = node.get_value("in").unwrap_err();
        assert_eq!(err.code(), "E202");

        node.set_input_value("in", Arc::new(json!({"v": 3}))).unwrap();
        assert_eq!(*node.get_value("in").unwrap(), json!({"v": 3}));
    }

    #[test]
    fn propagated_values_share_the_reference() {
        let node = probe("p");
        let shared = Arc::new(json!({"v": 3}));
        node.set_input_value("in", Arc::clone(&shared)).unwrap();
        assert!(Arc::ptr_eq(&node.get_value("in").unwrap(), &shared));
    }

    #[test]
    fn hybrid_readiness_tracks_value_outputs() {
        let node = probe("p");
        assert!(!node.value_outputs_ready());
        node.set_value("out", json!({"v": 9})).unwrap();
        assert!(node.value_outputs_ready());
    }

    #[test]
    fn config_resolution_preference() {
        let node = NodeInstance::new(
            "c",
            Some("configured".to_string()),
            json!({"url": "{{ base }}", "retries": {"max": 3}}),
            Arc::new(Probe),
        );
        assert_eq!(node.display_name(), "configured");
        assert_eq!(node.config_value("retries.max"), Some(json!(3)));
        assert_eq!(node.config_value("missing"), None);

        node.set_resolved_config(json!({"url": "https://x", "retries": {"max": 3}}));
        assert_eq!(node.config_value("url"), Some(json!("https://x")));
    }

    #[tokio::test]
    async fn feed_requires_allocation_then_validates() {
        let node = probe("p");
        let err = node.feed("stream_in", json!("hello")).await.unwrap_err();
        assert!(err.to_string().contains("not allocated"));

        node.allocate_fifos(4);
        node.feed("stream_in", json!("hello")).await.unwrap();

        let err = node.feed("stream_in", json!(42)).await.unwrap_err();
        assert_eq!(err.code(), "E201");

        node.close_input("stream_in").await.unwrap();
        let err = node.feed("stream_in", json!("late")).await.unwrap_err();
        assert_eq!(err.code(), "E203");
        let err = node.close_input("stream_in").await.unwrap_err();
        assert_eq!(err.code(), "E203");

        let mut rx = node.take_receiver("stream_in").unwrap();
        match rx.recv().await.unwrap() {
            StreamEntry::Chunk(c) => assert_eq!(*c.payload().as_ref(), json!("hello")),
            StreamEntry::End => panic!("expected chunk"),
        }
        assert!(rx.recv().await.unwrap().is_end());
    }

    #[test]
    fn output_stream_close_is_single_shot() {
        let node = probe("p");
        let chunk = node.open_output_chunk("stream_out", json!("a")).unwrap();
        assert_eq!(*chunk.payload().as_ref(), json!("a"));

        node.close_output_port("stream_out").unwrap();
        let err = node.open_output_chunk("stream_out", json!("b")).unwrap_err();
        assert_eq!(err.code(), "E203");
        let err = node.close_output_port("stream_out").unwrap_err();
        assert_eq!(err.code(), "E203");
    }
}
