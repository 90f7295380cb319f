//! Node type registry.
//!
//! Maps type names to factories that build node behaviors from `(node_id,
//! raw_config)`. Registration is idempotent per factory type; registering
//! the same name with a *different* factory is a configuration error. A
//! process-global registry backs module-level self-registration, mirroring
//! decorator-style registration; engines can also carry their own registry.

use crate::error::{Result, WeftError};
use crate::traits::node::Node;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds node behaviors of one registered type.
pub trait NodeFactory: Send + Sync + 'static {
    /// The type name this factory creates (as used in descriptions).
    fn type_name(&self) -> &str;

    /// Create a behavior for a node instance.
    fn create(&self, node_id: &str, config: &Value) -> Result<Arc<dyn Node>>;
}

struct Entry {
    factory: Arc<dyn NodeFactory>,
    token: TypeId,
}

/// Registry of node type factories.
#[derive(Default)]
pub struct NodeRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its declared type name.
    ///
    /// Re-registering the same factory type is a no-op; a different factory
    /// type under an existing name is rejected.
    pub fn register<F: NodeFactory>(&self, factory: F) -> Result<()> {
        let name = factory.type_name().to_string();
        let token = TypeId::of::<F>();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&name) {
            if existing.token == token {
                return Ok(());
            }
            return Err(WeftError::DuplicateRegistration { type_name: name });
        }
        entries.insert(
            name,
            Entry {
                factory: Arc::new(factory),
                token,
            },
        );
        Ok(())
    }

    /// Check whether a type name is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.read().contains_key(type_name)
    }

    /// Instantiate a behavior for a node of a registered type.
    pub fn create(&self, type_name: &str, node_id: &str, config: &Value) -> Result<Arc<dyn Node>> {
        let factory = {
            let entries = self.entries.read();
            entries
                .get(type_name)
                .map(|e| Arc::clone(&e.factory))
                .ok_or_else(|| WeftError::UnknownType {
                    node_id: node_id.to_string(),
                    type_name: type_name.to_string(),
                })?
        };
        factory.create(node_id, config)
    }

    /// All registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

static GLOBAL: Lazy<NodeRegistry> = Lazy::new(NodeRegistry::new);

/// The process-global registry used for self-registering node types.
pub fn global() -> &'static NodeRegistry {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::context::NodeContext;
    use crate::traits::node::{NodeDescriptor, NodeFuture};

    struct Nop;

    impl Node for Nop {
        fn descriptor(&self) -> NodeDescriptor {
            NodeDescriptor::new("nop")
        }

        fn run<'a>(&'a self, _ctx: NodeContext) -> NodeFuture<'a> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    struct NopFactory;

    impl NodeFactory for NopFactory {
        fn type_name(&self) -> &str {
            "nop"
        }

        fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn Node>> {
            Ok(Arc::new(Nop))
        }
    }

    struct OtherNopFactory;

    impl NodeFactory for OtherNopFactory {
        fn type_name(&self) -> &str {
            "nop"
        }

        fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn Node>> {
            Ok(Arc::new(Nop))
        }
    }

    #[test]
    fn registration_is_idempotent_per_factory_type() {
        let registry = NodeRegistry::new();
        registry.register(NopFactory).unwrap();
        registry.register(NopFactory).unwrap();
        assert!(registry.contains("nop"));
        assert_eq!(registry.type_names(), vec!["nop"]);
    }

    #[test]
    fn conflicting_factory_is_rejected() {
        let registry = NodeRegistry::new();
        registry.register(NopFactory).unwrap();
        let err = registry.register(OtherNopFactory).unwrap_err();
        assert_eq!(err.code(), "E109");
    }

    #[test]
    fn create_resolves_registered_types() {
        let registry = NodeRegistry::new();
        registry.register(NopFactory).unwrap();
        let behavior = registry.create("nop", "n1", &Value::Null).unwrap();
        assert_eq!(behavior.descriptor().type_name, "nop");

        let err = registry.create("ghost", "n1", &Value::Null).unwrap_err();
        assert_eq!(err.code(), "E102");
        assert!(err.to_string().contains("ghost"));
    }
}
