//! Controller configuration.

use crate::observability::TracingConfig;
use std::time::Duration;

/// Configuration for a [`PipelineController`](super::PipelineController).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Messages the watch queue holds before new ones are dropped.
    pub watch_capacity: usize,
    /// How long `stop()` waits for the engine to confirm `Null`.
    pub state_timeout: Duration,
    /// Buffer of the async event broadcast.
    pub publish_capacity: usize,
    /// Spans opened around lifecycle requests.
    pub tracing: TracingConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_capacity: 64,
            state_timeout: Duration::from_secs(5),
            publish_capacity: 256,
            tracing: TracingConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Create a config with a custom watch queue capacity.
    pub fn with_watch_capacity(watch_capacity: usize) -> Self {
        Self {
            watch_capacity,
            ..Default::default()
        }
    }

    /// Short timeouts and small queues, for tests and dry runs.
    pub fn testing() -> Self {
        Self {
            watch_capacity: 16,
            state_timeout: Duration::from_millis(100),
            publish_capacity: 32,
            tracing: TracingConfig::none(),
        }
    }

    /// Set how long `stop()` waits for confirmation.
    pub fn state_timeout(mut self, timeout: Duration) -> Self {
        self.state_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let config = ControllerConfig::default();
        assert_eq!(config.watch_capacity, 64);

        let config = ControllerConfig::with_watch_capacity(4).state_timeout(Duration::ZERO);
        assert_eq!(config.watch_capacity, 4);
        assert_eq!(config.state_timeout, Duration::ZERO);
        assert_eq!(config.publish_capacity, 256);
    }
}
