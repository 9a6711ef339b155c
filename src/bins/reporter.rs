//! Reporter bin: a pass-through queue that marks where reports are taken.

use super::ChainBuilder;
use crate::error::Result;
use crate::graph::{Graph, NodeId};

/// A single queue exposed as both "sink" and "src".
#[derive(Debug)]
pub struct ReporterBin {
    bin: NodeId,
    queue: NodeId,
}

impl ReporterBin {
    /// Build the bin.
    pub fn new(graph: &mut Graph, name: &str) -> Result<Self> {
        let mut builder = ChainBuilder::new(graph, name)?;
        let queue = builder.element("queue", "queue")?;
        let bin = builder.finish()?;
        Ok(Self { bin, queue })
    }

    /// The bin node.
    pub fn bin(&self) -> NodeId {
        self.bin
    }

    /// The queue inside the bin.
    pub fn queue(&self) -> NodeId {
        self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use std::sync::Arc;

    #[test]
    fn test_reporter_is_one_queue() {
        let mut g = Graph::new(Arc::new(MemoryEngine::new()));
        let reporter = ReporterBin::new(&mut g, "reporter").unwrap();

        assert_eq!(g.children(reporter.bin()), vec![reporter.queue()]);
        assert_eq!(g.ghost_pads(reporter.bin()), ["sink", "src"]);
        assert!(g.link_all(reporter.bin()));
        assert!(g.is_linked(reporter.bin()));
        g.unlink_all(reporter.bin());
        assert!(!g.is_linked(reporter.bin()));
    }
}
