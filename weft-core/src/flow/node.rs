//! Node entry in a workflow description.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One node in a workflow description.
///
/// # Example
///
/// ```yaml
/// nodes:
///   - id: fetch
///     type: http
///     name: Fetch profile
///     config:
///       url: "{{ base_url }}/profile"
///       method: GET
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique node id.
    pub id: String,

    /// Registered type name.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Display name (defaults to the id).
    #[serde(default)]
    pub name: Option<String>,

    /// Node-specific configuration, passed verbatim; may contain templates.
    #[serde(default)]
    pub config: Value,
}

impl NodeSpec {
    /// Create a node spec with an empty configuration.
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            name: None,
            config: Value::Null,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_node_spec() {
        let yaml = r#"
id: fetch
type: http
config:
  url: "https://example.com"
"#;
        let spec: NodeSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.id, "fetch");
        assert_eq!(spec.type_name, "http");
        assert_eq!(spec.config["url"], json!("https://example.com"));
        assert!(spec.name.is_none());
    }

    #[test]
    fn builder() {
        let spec = NodeSpec::new("a", "start")
            .with_name("Entry")
            .with_config(json!({"data": 1}));
        assert_eq!(spec.name.as_deref(), Some("Entry"));
        assert_eq!(spec.config["data"], json!(1));
    }
}
