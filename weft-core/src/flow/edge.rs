//! Connection entry in a workflow description.

use crate::error::{Result, WeftError};
use serde::{Deserialize, Serialize};

/// One connection in a workflow description.
///
/// Endpoints are written as `node_id.port_name`:
///
/// ```yaml
/// connections:
///   - from: asr.text
///     to: agent.user_text
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Source endpoint, `node_id.port_name`.
    pub from: String,

    /// Target endpoint, `node_id.port_name`.
    pub to: String,
}

impl EdgeSpec {
    /// Create an edge spec.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Parse the source into `(node_id, port_name)`.
    pub fn source(&self) -> Result<(&str, &str)> {
        split_endpoint(&self.from)
    }

    /// Parse the target into `(node_id, port_name)`.
    pub fn target(&self) -> Result<(&str, &str)> {
        split_endpoint(&self.to)
    }
}

fn split_endpoint(endpoint: &str) -> Result<(&str, &str)> {
    match endpoint.split_once('.') {
        Some((node, port)) if !node.is_empty() && !port.is_empty() => Ok((node, port)),
        _ => Err(WeftError::EdgeFormat {
            endpoint: endpoint.to_string(),
        }),
    }
}
