//! The node contract.
//!
//! A node is a typed unit of computation with named input and output ports.
//! Concrete behaviors implement [`Node`]; the engine pairs each behavior
//! with runtime port state and only ever consults the declared mode and
//! ports — it never downcasts.

use super::context::NodeContext;
use crate::chunk::Chunk;
use crate::error::Result;
use crate::schema::PortSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Scheduling posture of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Task-driven: `run` executes once and returns a result.
    Sequential,
    /// Data-driven: `run` is a long-lived task reacting to input chunks.
    Streaming,
    /// Task-driven initialization, then keeps running to service streams.
    Hybrid,
}

impl ExecutionMode {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Streaming => "streaming",
            Self::Hybrid => "hybrid",
        }
    }

    /// Task-driven nodes participate in the topological walk.
    pub fn is_task_driven(&self) -> bool {
        matches!(self, Self::Sequential | Self::Hybrid)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a node within one invocation.
///
/// Transitions are monotonic: pending → running → one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not yet started.
    Pending,
    /// `run` has been invoked.
    Running,
    /// `run` returned normally.
    Succeeded,
    /// `run` or `on_chunk` raised an unhandled failure.
    Failed,
    /// The scheduler cancelled the node's task.
    Cancelled,
}

impl NodeStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Ordering rank used to enforce monotonic transitions.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed | Self::Cancelled => 2,
        }
    }

    /// Check whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declaration of one port.
#[derive(Debug, Clone)]
pub struct PortDecl {
    /// Port name.
    pub name: String,
    /// Schema the port carries.
    pub schema: PortSchema,
}

impl PortDecl {
    /// Create a port declaration.
    pub fn new(name: impl Into<String>, schema: PortSchema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Class-level declaration of a node type: mode plus port tables.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    /// Type name as used in workflow descriptions (e.g. "start", "http").
    pub type_name: String,
    /// Scheduling posture.
    pub mode: ExecutionMode,
    /// Description of what the node does.
    pub description: String,
    /// Input port declarations.
    pub inputs: Vec<PortDecl>,
    /// Output port declarations.
    pub outputs: Vec<PortDecl>,
}

impl NodeDescriptor {
    /// Create a descriptor with no ports, sequential by default.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            mode: ExecutionMode::Sequential,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Add an input port.
    pub fn with_input(mut self, name: impl Into<String>, schema: PortSchema) -> Self {
        self.inputs.push(PortDecl::new(name, schema));
        self
    }

    /// Add an output port.
    pub fn with_output(mut self, name: impl Into<String>, schema: PortSchema) -> Self {
        self.outputs.push(PortDecl::new(name, schema));
        self
    }

    /// Get an input declaration by name.
    pub fn input(&self, name: &str) -> Option<&PortDecl> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Get an output declaration by name.
    pub fn output(&self, name: &str) -> Option<&PortDecl> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// A boxed future for async node execution.
pub type NodeFuture<'a, T = Value> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The core trait for all weft nodes.
///
/// # Example
///
/// ```ignore
/// use weft_core::prelude::*;
///
/// struct Doubler;
///
/// impl Node for Doubler {
///     fn descriptor(&self) -> NodeDescriptor {
///         NodeDescriptor::new("doubler")
///             .with_input("in", PortSchema::value_struct([("v", AtomType::Integer)]))
///             .with_output("out", PortSchema::value_struct([("v", AtomType::Integer)]))
///     }
///
///     fn run<'a>(&'a self, ctx: NodeContext) -> NodeFuture<'a> {
///         Box::pin(async move {
///             let v = ctx.get_value("in")?;
///             let doubled = serde_json::json!({"v": v["v"].as_i64().unwrap_or(0) * 2});
///             ctx.set_value("out", doubled.clone())?;
///             Ok(doubled)
///         })
///     }
/// }
/// ```
pub trait Node: Send + Sync {
    /// Declared mode and port tables for this node type.
    fn descriptor(&self) -> NodeDescriptor;

    /// The sole entry point invoked by the scheduler.
    ///
    /// Mode contracts:
    /// - `sequential`: return a result; it becomes the node's recorded output.
    /// - `streaming`: keep running until cancelled or inputs drain.
    /// - `hybrid`: initialize, write declared value outputs, then suspend to
    ///   service streams; returning early is also a valid readiness signal.
    fn run<'a>(&'a self, ctx: NodeContext) -> NodeFuture<'a>;

    /// Called by the port's consumer task for each chunk arriving on a
    /// streaming input. Default is a no-op.
    fn on_chunk<'a>(
        &'a self,
        ctx: NodeContext,
        port: &'a str,
        chunk: Arc<Chunk>,
    ) -> NodeFuture<'a, ()> {
        let _ = (ctx, port, chunk);
        Box::pin(async { Ok(()) })
    }

    /// Called by the scheduler after graph wiring, before consumers launch.
    /// Streaming FIFOs are already allocated when this runs.
    fn initialize<'a>(&'a self, ctx: NodeContext) -> NodeFuture<'a, ()> {
        let _ = ctx;
        Box::pin(async { Ok(()) })
    }

    /// Called once during engine shutdown. Release resources here.
    fn shutdown<'a>(&'a self) -> NodeFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

impl fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("type_name", &self.descriptor().type_name)
            .finish()
    }
}
