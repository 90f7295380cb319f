//! Convenience re-exports for node authors.

pub use crate::chunk::{Chunk, StreamEntry};
pub use crate::connection::{Connection, ConnectionManager, EdgeKind, Endpoint};
pub use crate::context::WorkflowContext;
pub use crate::error::{Result, WeftError};
pub use crate::flow::{EdgeSpec, NodeSpec, WorkflowConfig, WorkflowDefinition, WorkflowDocument};
pub use crate::instance::NodeInstance;
pub use crate::logging::{LogEvent, LogLevel};
pub use crate::registry::{NodeFactory, NodeRegistry};
pub use crate::schema::{AtomType, PortKind, PortSchema, SchemaShape};
pub use crate::template::TemplateResolver;
pub use crate::traits::{
    ExecutionMode, Node, NodeContext, NodeDescriptor, NodeFuture, NodeStatus, PortDecl,
};
