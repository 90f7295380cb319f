//! Structured execution log events.
//!
//! Every workflow invocation accumulates an ordered, append-only list of
//! events alongside the `tracing` output, so callers can inspect what
//! happened from the returned context without wiring a subscriber.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of an execution log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Informational messages.
    Info,
    /// A step completed successfully.
    Success,
    /// Something recoverable went wrong.
    Warning,
    /// A failure.
    Error,
}

impl LogLevel {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single structured log event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Timestamp in nanoseconds since the UNIX epoch.
    pub timestamp_ns: u64,
    /// Severity.
    pub level: LogLevel,
    /// The node this event concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl LogEvent {
    /// Create an event with the current timestamp.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp_ns: current_timestamp_ns(),
            level,
            node_id: None,
            message: message.into(),
        }
    }

    /// Create an info event.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    /// Create a success event.
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    /// Create a warning event.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// Scope the event to a node.
    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

fn current_timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Append-only, insertion-ordered event collector.
///
/// Writes are serialized; reads copy the current snapshot. Every collected
/// event is mirrored to `tracing` at the matching level.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<LogEvent>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and mirror it to `tracing`.
    pub fn record(&self, event: LogEvent) {
        match event.level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(node_id = event.node_id.as_deref(), "{}", event.message);
            }
            LogLevel::Warning => {
                tracing::warn!(node_id = event.node_id.as_deref(), "{}", event.message);
            }
            LogLevel::Error => {
                tracing::error!(node_id = event.node_id.as_deref(), "{}", event.message);
            }
        }
        self.events.lock().push(event);
    }

    /// Number of events collected so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check whether any events have been collected.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Copy out all events in insertion order.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_keep_insertion_order() {
        let log = EventLog::new();
        log.record(LogEvent::info("first"));
        log.record(LogEvent::warning("second").with_node("n1"));
        log.record(LogEvent::error("third"));

        let events = log.snapshot();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[1].node_id.as_deref(), Some("n1"));
        assert_eq!(events[2].level, LogLevel::Error);
    }

    #[test]
    fn level_serializes_uppercase() {
        let text = serde_json::to_string(&LogLevel::Warning).unwrap();
        assert_eq!(text, "\"WARNING\"");
        assert_eq!(LogLevel::Success.as_str(), "SUCCESS");
    }

    #[test]
    fn timestamps_are_monotone_enough() {
        let a = LogEvent::info("a");
        let b = LogEvent::info("b");
        assert!(b.timestamp_ns >= a.timestamp_ns);
    }
}
