//! Metrics collection using metrics-rs.

use metrics::{Counter, Unit, counter};
use std::sync::atomic::{AtomicBool, Ordering};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUS_MESSAGES: &str = "bingraph_bus_messages";
const STATE_CHANGES: &str = "bingraph_state_changes";
const LINK_FAILURES: &str = "bingraph_link_failures";
const BUS_DROPPED: &str = "bingraph_bus_dropped";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUS_MESSAGES,
        Unit::Count,
        "Bus messages seen by the sync path"
    );
    metrics::describe_counter!(
        STATE_CHANGES,
        Unit::Count,
        "Pipeline state changes confirmed on the watch path"
    );
    metrics::describe_counter!(
        LINK_FAILURES,
        Unit::Count,
        "Links refused by the engine and rolled back"
    );
    metrics::describe_counter!(
        BUS_DROPPED,
        Unit::Count,
        "Bus messages dropped because the watch queue was full"
    );
}

/// Record a message seen on a pipeline's bus.
#[inline]
pub fn record_bus_message(pipeline: &str, kind: &'static str) {
    counter!(BUS_MESSAGES, "pipeline" => pipeline.to_string(), "kind" => kind).increment(1);
}

/// Record a confirmed state change.
#[inline]
pub fn record_state_change(pipeline: &str, state: &'static str) {
    counter!(STATE_CHANGES, "pipeline" => pipeline.to_string(), "state" => state).increment(1);
}

/// Record a refused native link.
#[inline]
pub fn record_link_failure(src: &str, sink: &str) {
    counter!(LINK_FAILURES, "src" => src.to_string(), "sink" => sink.to_string()).increment(1);
}

/// Record a message dropped by a full watch queue.
#[inline]
pub fn record_bus_dropped() {
    counter!(BUS_DROPPED).increment(1);
}

/// Per-pipeline counters with the pipeline label pre-applied.
#[derive(Clone)]
pub struct PipelineMetrics {
    name: String,
    plays: Counter,
    pauses: Counter,
    stops: Counter,
    refusals: Counter,
}

impl PipelineMetrics {
    /// Create counters for the pipeline `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            plays: counter!("bingraph_requests", "pipeline" => name.to_string(), "request" => "play"),
            pauses: counter!("bingraph_requests", "pipeline" => name.to_string(), "request" => "pause"),
            stops: counter!("bingraph_requests", "pipeline" => name.to_string(), "request" => "stop"),
            refusals: counter!("bingraph_request_refusals", "pipeline" => name.to_string()),
        }
    }

    /// Record a lifecycle request toward `target` (`"play"`, `"pause"` or
    /// `"stop"`), and whether the engine refused it.
    #[inline]
    pub fn record_request(&self, target: &str, refused: bool) {
        match target {
            "play" => self.plays.increment(1),
            "pause" => self.pauses.increment(1),
            _ => self.stops.increment(1),
        }
        if refused {
            self.refusals.increment(1);
        }
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_pipeline_metrics() {
        let metrics = PipelineMetrics::new("test-pipeline");
        metrics.record_request("play", false);
        metrics.record_request("stop", true);
        assert_eq!(metrics.name(), "test-pipeline");
    }

    #[test]
    fn test_global_recording_functions() {
        // No recorder installed: all of these are no-ops.
        record_bus_message("test", "MESSAGE_EOS");
        record_state_change("test", "STATE_PLAYING");
        record_link_failure("a", "b");
        record_bus_dropped();
    }
}
