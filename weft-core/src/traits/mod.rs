//! Core traits: the node contract and its execution-time capability handle.

pub mod context;
pub mod node;

pub use context::NodeContext;
pub use node::{ExecutionMode, Node, NodeDescriptor, NodeFuture, NodeStatus, PortDecl};
