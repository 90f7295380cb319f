//! Workflow execution context.
//!
//! One context lives for the duration of an invocation. It records node
//! outputs, nested global variables addressed by dotted paths, and the
//! structured event log. All writes are serialized; reads may be concurrent.

use crate::logging::{EventLog, LogEvent, LogLevel};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Process-scoped store shared by every node in an invocation.
#[derive(Debug)]
pub struct WorkflowContext {
    outputs: RwLock<HashMap<String, Arc<Value>>>,
    globals: RwLock<Map<String, Value>>,
    events: EventLog,
    started_at: SystemTime,
}

impl WorkflowContext {
    /// Create an empty context stamped with the current time.
    pub fn new() -> Self {
        Self {
            outputs: RwLock::new(HashMap::new()),
            globals: RwLock::new(Map::new()),
            events: EventLog::new(),
            started_at: SystemTime::now(),
        }
    }

    /// When this invocation started.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    // ===== node outputs =====

    /// Record a node's output, replacing any previous one.
    pub fn set_output(&self, node_id: impl Into<String>, output: Arc<Value>) {
        self.outputs.write().insert(node_id.into(), output);
    }

    /// Read a node's recorded output.
    pub fn output(&self, node_id: &str) -> Option<Arc<Value>> {
        self.outputs.read().get(node_id).cloned()
    }

    /// Copy out all recorded outputs.
    pub fn outputs(&self) -> HashMap<String, Arc<Value>> {
        self.outputs.read().clone()
    }

    // ===== globals =====

    /// Set a global variable by dotted path.
    ///
    /// Intermediate mappings are created as needed; a non-mapping
    /// intermediate is overwritten.
    pub fn set_global(&self, dotted_key: &str, value: Value) {
        let mut globals = self.globals.write();
        let mut current: &mut Map<String, Value> = &mut globals;
        let mut segments = dotted_key.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.insert(segment.to_string(), value);
                return;
            }
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry.as_object_mut().expect("just ensured object");
        }
    }

    /// Read a global variable by dotted path.
    ///
    /// Returns `None` on any missing or non-mapping intermediate.
    pub fn global(&self, dotted_key: &str) -> Option<Value> {
        let globals = self.globals.read();
        let mut current: &Value = &Value::Null;
        for (i, segment) in dotted_key.split('.').enumerate() {
            current = if i == 0 {
                globals.get(segment)?
            } else {
                current.as_object()?.get(segment)?
            };
        }
        Some(current.clone())
    }

    /// Read a global variable, falling back to a default.
    pub fn global_or(&self, dotted_key: &str, default: Value) -> Value {
        self.global(dotted_key).unwrap_or(default)
    }

    /// Copy out the full globals map.
    pub fn globals(&self) -> Map<String, Value> {
        self.globals.read().clone()
    }

    // ===== logging =====

    /// Append an event to the log.
    pub fn record(&self, event: LogEvent) {
        self.events.record(event);
    }

    /// Log an info message.
    pub fn log_info(&self, message: impl Into<String>) {
        self.record(LogEvent::info(message));
    }

    /// Log a success message.
    pub fn log_success(&self, message: impl Into<String>) {
        self.record(LogEvent::success(message));
    }

    /// Log a warning message.
    pub fn log_warning(&self, message: impl Into<String>) {
        self.record(LogEvent::warning(message));
    }

    /// Log an error message.
    pub fn log_error(&self, message: impl Into<String>) {
        self.record(LogEvent::error(message));
    }

    /// Log a message scoped to a node.
    pub fn log_node(&self, level: LogLevel, node_id: &str, message: impl Into<String>) {
        self.record(LogEvent::new(level, message).with_node(node_id));
    }

    /// Copy out the event log.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.snapshot()
    }
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_set_then_get_round_trips() {
        let ctx = WorkflowContext::new();
        ctx.set_global("a.b", json!(7));
        assert_eq!(ctx.global("a.b"), Some(json!(7)));
        assert_eq!(ctx.global("a"), Some(json!({"b": 7})));
        assert_eq!(ctx.global_or("a.missing", json!("d")), json!("d"));
    }

    #[test]
    fn set_overwrites_non_mapping_intermediates() {
        let ctx = WorkflowContext::new();
        ctx.set_global("a", json!(1));
        ctx.set_global("a.b.c", json!("deep"));
        assert_eq!(ctx.global("a.b.c"), Some(json!("deep")));
    }

    #[test]
    fn get_through_non_mapping_returns_none() {
        let ctx = WorkflowContext::new();
        ctx.set_global("x", json!("scalar"));
        assert_eq!(ctx.global("x.y"), None);
        assert_eq!(ctx.global("missing"), None);
    }

    #[test]
    fn outputs_are_shared_by_reference() {
        let ctx = WorkflowContext::new();
        let output = Arc::new(json!({"v": 22}));
        ctx.set_output("c", Arc::clone(&output));
        let read = ctx.output("c").unwrap();
        assert!(Arc::ptr_eq(&read, &output));
        assert!(ctx.output("missing").is_none());
    }

    #[test]
    fn node_scoped_logging() {
        let ctx = WorkflowContext::new();
        ctx.log_node(LogLevel::Warning, "b", "slow");
        ctx.log_info("done");
        let events = ctx.events();
        assert_eq!(events[0].node_id.as_deref(), Some("b"));
        assert_eq!(events[1].level, LogLevel::Info);
    }
}
