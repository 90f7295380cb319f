//! Scheduler knobs from the workflow description.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// How long the scheduler waits for streaming work after the
    /// task-driven walk, in seconds.
    pub stream_timeout: f64,

    /// Keep executing after a node failure instead of aborting.
    pub continue_on_error: bool,

    /// High-water mark per streaming FIFO. Senders await space when a queue
    /// is full; nodes never observe this.
    pub stream_buffer: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            stream_timeout: 300.0,
            continue_on_error: false,
            stream_buffer: 256,
        }
    }
}

impl WorkflowConfig {
    /// Get the stream timeout as a Duration. Negative values clamp to zero.
    pub fn stream_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.stream_timeout.max(0.0)).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.stream_timeout, 300.0);
        assert!(!config.continue_on_error);
        assert_eq!(config.stream_buffer, 256);
    }

    #[test]
    fn deserialize_with_partial_fields() {
        let yaml = "stream_timeout: 30\ncontinue_on_error: true\n";
        let config: WorkflowConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.stream_timeout, 30.0);
        assert!(config.continue_on_error);
        assert_eq!(config.stream_buffer, 256);
    }

    #[test]
    fn timeout_clamps_to_zero() {
        let config = WorkflowConfig {
            stream_timeout: -1.0,
            ..Default::default()
        };
        assert_eq!(config.stream_timeout(), Duration::ZERO);
    }
}
