//! weft-nodes: the builtin node library.
//!
//! A minimal catalogue of reference nodes: `start` seeds data, `variable`
//! publishes globals, `http` performs one-shot requests, `timer` emits
//! periodic chunks, `relay` forwards a stream, and `collect` buffers a
//! stream into a global. Each is a worked example of the node contract;
//! real deployments register their own types alongside these.

pub mod collect;
pub mod http;
pub mod relay;
pub mod start;
pub mod timer;
pub mod variable;

pub use collect::CollectFactory;
pub use http::HttpFactory;
pub use relay::RelayFactory;
pub use start::StartFactory;
pub use timer::TimerFactory;
pub use variable::VariableFactory;

use weft_core::error::Result;
use weft_core::registry::{self, NodeRegistry};

/// Register every builtin node type on a registry.
pub fn register_builtins(registry: &NodeRegistry) -> Result<()> {
    registry.register(StartFactory)?;
    registry.register(VariableFactory)?;
    registry.register(HttpFactory)?;
    registry.register(TimerFactory)?;
    registry.register(RelayFactory)?;
    registry.register(CollectFactory)?;
    Ok(())
}

/// Register every builtin on the process-global registry, making them
/// visible to any engine without explicit setup.
pub fn install() -> Result<()> {
    register_builtins(registry::global())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_idempotently() {
        let registry = NodeRegistry::new();
        register_builtins(&registry).unwrap();
        register_builtins(&registry).unwrap();
        let names = registry.type_names();
        assert_eq!(
            names,
            vec!["collect", "http", "relay", "start", "timer", "variable"]
        );
    }

    #[test]
    fn install_targets_the_global_registry() {
        install().unwrap();
        install().unwrap();
        assert!(registry::global().contains("start"));
        assert!(registry::global().contains("timer"));
    }
}
