//! Observability: metrics and tracing.
//!
//! ## Metrics
//!
//! Counters are recorded through the `metrics` facade; install any recorder
//! (prometheus, statsd, ...) to collect them.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `bingraph_bus_messages` | Counter | Messages seen by the sync path, by kind |
//! | `bingraph_state_changes` | Counter | Confirmed pipeline state changes |
//! | `bingraph_link_failures` | Counter | Native link refusals |
//! | `bingraph_bus_dropped` | Counter | Messages dropped by a full watch queue |
//!
//! ## Tracing
//!
//! Graph mutations log at debug, lifecycle requests and confirmed state
//! changes at info, engine failures and bus warnings/errors at warn/error.
//! Spans cover pipeline lifecycle requests and registry operations on a
//! node.

mod metrics;
mod tracing_support;

pub use metrics::{
    PipelineMetrics, init_metrics, record_bus_dropped, record_bus_message, record_link_failure,
    record_state_change,
};
pub use tracing_support::{TracingConfig, span_node, span_pipeline};
