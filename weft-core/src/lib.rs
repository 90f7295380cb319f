//! weft-core: data model and runtime primitives for the weft dataflow
//! workflow engine.
//!
//! A workflow is a graph of typed nodes. Each node declares input and
//! output ports carrying either a single latched value or an unbounded
//! stream of chunks; connections between ports are classified accordingly.
//! Value edges order the task-driven walk; streaming edges carry chunks
//! between long-lived cooperative tasks and may form feedback cycles.
//!
//! This crate holds everything below the scheduler: schemas and chunks,
//! port and node runtime state, the connection registry, the workflow
//! context and event log, the template resolver, the node registry, and
//! the description documents. The scheduler itself lives in
//! `weft-executor`, the builtin node library in `weft-nodes`.

pub mod chunk;
pub mod connection;
pub mod context;
pub mod error;
pub mod flow;
pub mod instance;
pub mod logging;
pub mod port;
pub mod prelude;
pub mod registry;
pub mod schema;
pub mod template;
pub mod traits;

pub use error::{Result, WeftError};
