//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Which spans the controller and registry open.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Open a span around pipeline lifecycle requests.
    pub pipeline_spans: bool,
    /// Open a span around registry operations on a single node.
    pub node_spans: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            pipeline_spans: true,
            node_spans: false,
        }
    }
}

impl TracingConfig {
    /// All spans enabled.
    pub fn all() -> Self {
        Self {
            pipeline_spans: true,
            node_spans: true,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            pipeline_spans: false,
            node_spans: false,
        }
    }

    /// A pipeline span, or a disabled span when pipeline spans are off.
    pub fn pipeline(&self, name: &str) -> Span {
        if self.pipeline_spans {
            span_pipeline(name)
        } else {
            Span::none()
        }
    }

    /// A node span, or a disabled span when node spans are off.
    pub fn node(&self, pipeline: &str, node: &str) -> Span {
        if self.node_spans {
            span_node(pipeline, node)
        } else {
            Span::none()
        }
    }
}

/// Create a span for a pipeline.
///
/// ```rust,ignore
/// let _guard = span_pipeline("pipeline").entered();
/// ```
#[inline]
pub fn span_pipeline(name: &str) -> Span {
    span!(Level::INFO, "pipeline", name = %name)
}

/// Create a span for a node of a pipeline.
#[inline]
pub fn span_node(pipeline: &str, node: &str) -> Span {
    span!(Level::DEBUG, "node", pipeline = %pipeline, node = %node)
}
