//! Error types for weft.
//!
//! Strongly-typed errors with actionable context. Every variant carries the
//! identifiers (node id, port name) needed to trace a failure back to the
//! workflow description or the offending call site.

use thiserror::Error;

/// The main error type for weft operations.
#[derive(Error, Debug)]
pub enum WeftError {
    // =========================================================================
    // Configuration errors (E100-E199) — fatal at load
    // =========================================================================
    /// A required field is absent from the workflow description.
    #[error("E101: Missing required field '{field}'")]
    MissingField {
        /// Dotted path of the missing field (e.g. "workflow.name").
        field: String,
    },

    /// A node references a type that is not registered.
    #[error("E102: Unknown node type '{type_name}' (node '{node_id}')")]
    UnknownType {
        /// The node whose type could not be resolved.
        node_id: String,
        /// The unregistered type name.
        type_name: String,
    },

    /// Two nodes in the description share an id.
    #[error("E103: Duplicate node id '{node_id}'")]
    DuplicateId {
        /// The colliding node id.
        node_id: String,
    },

    /// An edge references a node or port that does not exist.
    #[error("E104: Unknown endpoint '{node_id}.{port}': {cause}")]
    UnknownEndpoint {
        /// The referenced node id.
        node_id: String,
        /// The referenced port name.
        port: String,
        /// What exactly is missing.
        cause: String,
    },

    /// An edge endpoint spec is not of the form `node.port`.
    #[error("E105: Malformed edge endpoint '{endpoint}': expected 'node_id.port_name'")]
    EdgeFormat {
        /// The offending endpoint string.
        endpoint: String,
    },

    /// An edge connects a streaming port to a value port.
    #[error(
        "E106: Kind mismatch on edge {source_endpoint} -> {target_endpoint}: \
         source is {source_kind}, target is {target_kind}"
    )]
    KindMismatch {
        /// Source endpoint as `node.port`.
        source_endpoint: String,
        /// Target endpoint as `node.port`.
        target_endpoint: String,
        /// Kind of the source port.
        source_kind: String,
        /// Kind of the target port.
        target_kind: String,
    },

    /// An edge connects ports whose schemas are not structurally equal.
    #[error(
        "E107: Schema mismatch on edge {source_endpoint} -> {target_endpoint}:\n  \
         source: {source_schema}\n  target: {target_schema}"
    )]
    SchemaMismatch {
        /// Source endpoint as `node.port`.
        source_endpoint: String,
        /// Target endpoint as `node.port`.
        target_endpoint: String,
        /// Full rendering of the source schema.
        source_schema: String,
        /// Full rendering of the target schema.
        target_schema: String,
    },

    /// The value-edge subgraph contains a cycle.
    #[error("E108: Cycle among value edges involving nodes: {nodes:?}")]
    Cycle {
        /// The nodes participating in the cycle.
        nodes: Vec<String>,
    },

    /// A type name was registered twice with different factories.
    #[error("E109: Node type '{type_name}' already registered with a different factory")]
    DuplicateRegistration {
        /// The contested type name.
        type_name: String,
    },

    // =========================================================================
    // Validation errors (E200-E299) — surfaced at the offending call
    // =========================================================================
    /// A payload failed schema validation.
    #[error("E201: Validation failed on {node_id}.{port}: {cause}")]
    Validation {
        /// The node owning the port.
        node_id: String,
        /// The port whose schema rejected the payload.
        port: String,
        /// Why validation failed.
        cause: String,
    },

    /// A value port was read before anything was written to it.
    #[error("E202: Value port {node_id}.{port} is empty")]
    PortEmpty {
        /// The node owning the port.
        node_id: String,
        /// The empty port.
        port: String,
    },

    /// A streaming port was written after end-of-stream.
    #[error("E203: Stream {node_id}.{port} is closed")]
    StreamClosed {
        /// The node owning the port.
        node_id: String,
        /// The closed port.
        port: String,
    },

    // =========================================================================
    // Runtime errors (E300-E399)
    // =========================================================================
    /// A node raised during `run` or `on_chunk`.
    #[error("E301: Node '{node_id}' execution failed: {cause}")]
    NodeExecution {
        /// The failing node.
        node_id: String,
        /// The original failure, rendered.
        cause: String,
    },

    /// Outstanding streaming work exceeded the configured stream timeout.
    #[error("E302: Stream timeout after {timeout_secs}s with {outstanding} outstanding task(s)")]
    Timeout {
        /// The configured timeout in seconds.
        timeout_secs: f64,
        /// Number of tasks still running when the deadline hit.
        outstanding: usize,
    },

    /// A task was cancelled by the scheduler or an external stop.
    #[error("E303: Cancelled{}", .node_id.as_deref().map(|n| format!(" (node '{n}')")).unwrap_or_default())]
    Cancelled {
        /// The node whose task was cancelled, when known.
        node_id: Option<String>,
    },

    /// Template rendering failed.
    #[error("E304: Template error in '{template}': {cause}")]
    Template {
        /// The template text being rendered.
        template: String,
        /// Why rendering failed.
        cause: String,
    },

    /// Failed to parse a workflow description.
    #[error("E305: Failed to parse workflow description: {cause}")]
    Parse {
        /// The underlying parse failure.
        cause: String,
    },

    /// The engine was driven out of order (start before load, double start).
    #[error("E306: Engine state error: {cause}")]
    State {
        /// What was wrong.
        cause: String,
    },
}

impl WeftError {
    /// Get the error code (e.g. "E101").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "E101",
            Self::UnknownType { .. } => "E102",
            Self::DuplicateId { .. } => "E103",
            Self::UnknownEndpoint { .. } => "E104",
            Self::EdgeFormat { .. } => "E105",
            Self::KindMismatch { .. } => "E106",
            Self::SchemaMismatch { .. } => "E107",
            Self::Cycle { .. } => "E108",
            Self::DuplicateRegistration { .. } => "E109",
            Self::Validation { .. } => "E201",
            Self::PortEmpty { .. } => "E202",
            Self::StreamClosed { .. } => "E203",
            Self::NodeExecution { .. } => "E301",
            Self::Timeout { .. } => "E302",
            Self::Cancelled { .. } => "E303",
            Self::Template { .. } => "E304",
            Self::Parse { .. } => "E305",
            Self::State { .. } => "E306",
        }
    }

    /// Check if this is a configuration error (fatal at load).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::UnknownType { .. }
                | Self::DuplicateId { .. }
                | Self::UnknownEndpoint { .. }
                | Self::EdgeFormat { .. }
                | Self::KindMismatch { .. }
                | Self::SchemaMismatch { .. }
                | Self::Cycle { .. }
                | Self::DuplicateRegistration { .. }
                | Self::Parse { .. }
        )
    }

    /// Check if this is a payload validation error.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::PortEmpty { .. } | Self::StreamClosed { .. }
        )
    }

    /// Wrap an arbitrary failure as a node execution error, preserving the
    /// original error text. Node execution errors pass through unchanged so
    /// the innermost node id wins.
    pub fn for_node(self, node_id: &str) -> Self {
        match self {
            Self::NodeExecution { .. } | Self::Cancelled { .. } => self,
            other => Self::NodeExecution {
                node_id: node_id.to_string(),
                cause: other.to_string(),
            },
        }
    }
}

/// Result type alias using [`WeftError`].
pub type Result<T> = std::result::Result<T, WeftError>;
