//! Primary inference bin.

use super::ChainBuilder;
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};

/// `queue → nvinfer`, running the primary detector.
#[derive(Debug)]
pub struct PrimaryGieBin {
    bin: NodeId,
    infer: NodeId,
    infer_config_file: String,
    model_engine_file: String,
    interval: u32,
    unique_id: u32,
    gpu_id: u32,
}

impl PrimaryGieBin {
    /// Build the bin. `interval` is the number of batches skipped between
    /// inferences.
    pub fn new(
        graph: &mut Graph,
        name: &str,
        infer_config_file: &str,
        model_engine_file: &str,
        interval: u32,
        unique_id: u32,
    ) -> Result<Self> {
        if infer_config_file.is_empty() {
            return Err(Error::InvalidValue("empty inference config path".to_string()));
        }

        let mut builder = ChainBuilder::new(graph, name)?;
        builder.element("queue", "queue")?;
        let infer = builder.element("nvinfer", "nvinfer")?;
        let g = builder.graph();
        g.set_attribute(infer, "config-file-path", infer_config_file)?;
        if !model_engine_file.is_empty() {
            g.set_attribute(infer, "model-engine-file", model_engine_file)?;
        }
        g.set_attribute(infer, "interval", interval)?;
        g.set_attribute(infer, "unique-id", unique_id)?;
        let bin = builder.finish()?;

        Ok(Self {
            bin,
            infer,
            infer_config_file: infer_config_file.to_string(),
            model_engine_file: model_engine_file.to_string(),
            interval,
            unique_id,
            gpu_id: 0,
        })
    }

    /// The bin node.
    pub fn bin(&self) -> NodeId {
        self.bin
    }

    /// Inference configuration file.
    pub fn infer_config_file(&self) -> &str {
        &self.infer_config_file
    }

    /// Serialized model engine file, empty when built at startup.
    pub fn model_engine_file(&self) -> &str {
        &self.model_engine_file
    }

    /// Batches skipped between inferences.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Change the inference interval.
    pub fn set_interval(&mut self, graph: &mut Graph, interval: u32) -> Result<()> {
        graph.set_attribute(self.infer, "interval", interval)?;
        self.interval = interval;
        Ok(())
    }

    /// Identifier stamped on this detector's metadata.
    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    /// GPU running the inference.
    pub fn gpu_id(&self) -> u32 {
        self.gpu_id
    }

    /// Run inference on another GPU.
    pub fn set_gpu_id(&mut self, graph: &mut Graph, gpu_id: u32) -> Result<()> {
        graph.set_attribute(self.infer, "gpu-id", gpu_id)?;
        self.gpu_id = gpu_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::PropertyValue;
    use crate::engine::MemoryEngine;
    use std::sync::Arc;

    const CONFIG: &str = "./configs/config_infer_primary.txt";
    const MODEL: &str = "./models/resnet10.caffemodel";

    #[test]
    fn test_members_set_up() {
        let mut g = Graph::new(Arc::new(MemoryEngine::new()));
        let gie = PrimaryGieBin::new(&mut g, "primary-gie", CONFIG, MODEL, 1, 0).unwrap();

        assert_eq!(gie.infer_config_file(), CONFIG);
        assert_eq!(gie.model_engine_file(), MODEL);
        assert_eq!(gie.interval(), 1);
        assert_eq!(gie.unique_id(), 0);
        assert!(!g.is_linked(gie.bin()));
        assert_eq!(
            g.attribute(gie.infer, "config-file-path"),
            Some(PropertyValue::Text(CONFIG.to_string()))
        );
    }

    #[test]
    fn test_link_and_unlink() {
        let mut g = Graph::new(Arc::new(MemoryEngine::new()));
        let mut gie = PrimaryGieBin::new(&mut g, "primary-gie", CONFIG, "", 1, 0).unwrap();

        assert!(g.link_all(gie.bin()));
        assert!(g.is_linked(gie.bin()));
        g.unlink_all(gie.bin());
        assert!(!g.is_linked(gie.bin()));

        gie.set_interval(&mut g, 4).unwrap();
        gie.set_gpu_id(&mut g, 1).unwrap();
        assert_eq!(g.attribute(gie.infer, "interval"), Some(PropertyValue::UInt(4)));
        assert_eq!(g.attribute(gie.infer, "model-engine-file"), None);
    }
}
