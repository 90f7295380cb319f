//! Workflow definition — the top-level document.

use super::{EdgeSpec, NodeSpec, WorkflowConfig};
use crate::error::{Result, WeftError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A complete workflow description.
///
/// # Example
///
/// ```yaml
/// workflow:
///   name: voice_pipeline
///   version: "1.0"
///   config:
///     stream_timeout: 30
///     continue_on_error: false
///   nodes:
///     - id: start
///       type: start
///       config:
///         data: { session: "demo" }
///     - id: agent
///       type: agent
///   connections:
///     - from: start.output
///       to: agent.seed
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name (required).
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,

    /// Version string.
    #[serde(default)]
    pub version: Option<String>,

    /// Scheduler knobs.
    #[serde(default)]
    pub config: WorkflowConfig,

    /// Nodes, in declaration order.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    /// Connections between node ports.
    #[serde(default)]
    pub connections: Vec<EdgeSpec>,
}

impl WorkflowDefinition {
    /// Create an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            version: None,
            config: WorkflowConfig::default(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Set the scheduler configuration.
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a node.
    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a connection.
    pub fn with_connection(mut self, edge: EdgeSpec) -> Self {
        self.connections.push(edge);
        self
    }

    /// Check structural requirements: non-empty name, at least one node,
    /// non-empty ids and types, unique ids.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WeftError::MissingField {
                field: "workflow.name".to_string(),
            });
        }
        if self.nodes.is_empty() {
            return Err(WeftError::MissingField {
                field: "workflow.nodes".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(WeftError::MissingField {
                    field: "workflow.nodes[].id".to_string(),
                });
            }
            if node.type_name.trim().is_empty() {
                return Err(WeftError::MissingField {
                    field: format!("workflow.nodes[{}].type", node.id),
                });
            }
            if !seen.insert(node.id.as_str()) {
                return Err(WeftError::DuplicateId {
                    node_id: node.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Get a node spec by id.
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// The on-disk wrapper: everything lives under a `workflow:` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    /// The definition itself.
    pub workflow: WorkflowDefinition,
}

impl WorkflowDocument {
    /// Parse a document from YAML.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| WeftError::Parse {
            cause: e.to_string(),
        })
    }

    /// Parse a document from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| WeftError::Parse {
            cause: e.to_string(),
        })
    }

    /// Load a document from a file, choosing the parser by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| WeftError::Parse {
            cause: format!("failed to read '{}': {e}", path.display()),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            Some("json") => Self::from_json(&text),
            other => Err(WeftError::Parse {
                cause: format!("unsupported description format: {other:?}"),
            }),
        }
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| WeftError::Parse {
            cause: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_complete_document() {
        let yaml = r#"
workflow:
  name: voice_pipeline
  description: streaming voice loop
  version: "2.0"
  config:
    stream_timeout: 30
    continue_on_error: true
  nodes:
    - id: start
      type: start
      config:
        data: { session: demo }
    - id: agent
      type: agent
  connections:
    - from: start.output
      to: agent.seed
"#;
        let doc = WorkflowDocument::from_yaml(yaml).unwrap();
        let wf = &doc.workflow;
        assert_eq!(wf.name, "voice_pipeline");
        assert_eq!(wf.version.as_deref(), Some("2.0"));
        assert_eq!(wf.config.stream_timeout, 30.0);
        assert!(wf.config.continue_on_error);
        assert_eq!(wf.nodes.len(), 2);
        assert_eq!(wf.nodes[0].config["data"]["session"], json!("demo"));
        assert_eq!(wf.connections.len(), 1);
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn json_documents_parse_too() {
        let text = r#"{"workflow": {"name": "j", "nodes": [{"id": "a", "type": "start"}]}}"#;
        let doc = WorkflowDocument::from_json(text).unwrap();
        assert_eq!(doc.workflow.name, "j");
    }

    #[test]
    fn missing_name_is_rejected() {
        let wf = WorkflowDefinition::new("  ");
        let err = wf.validate().unwrap_err();
        assert_eq!(err.code(), "E101");
        assert!(err.to_string().contains("workflow.name"));
    }

    #[test]
    fn empty_node_list_is_rejected() {
        let wf = WorkflowDefinition::new("empty");
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("workflow.nodes"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let wf = WorkflowDefinition::new("dup")
            .with_node(NodeSpec::new("a", "start"))
            .with_node(NodeSpec::new("a", "start"));
        let err = wf.validate().unwrap_err();
        assert_eq!(err.code(), "E103");
    }

    #[test]
    fn yaml_round_trip() {
        let doc = WorkflowDocument {
            workflow: WorkflowDefinition::new("rt")
                .with_node(NodeSpec::new("a", "start"))
                .with_connection(EdgeSpec::new("a.out", "b.in")),
        };
        let text = doc.to_yaml().unwrap();
        let back = WorkflowDocument::from_yaml(&text).unwrap();
        assert_eq!(back.workflow.name, "rt");
        assert_eq!(back.workflow.nodes.len(), 1);
        assert_eq!(back.workflow.connections.len(), 1);
    }
}
