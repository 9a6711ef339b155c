//! Element nodes.

use super::{Graph, NodeId, NodeKind};
use crate::element::PropertyValue;
use crate::error::{Error, Result};

impl Graph {
    /// Create an element from a named factory.
    ///
    /// Fails with [`Error::ConstructionFailure`] when the engine cannot
    /// instantiate the factory. The element starts unparented and unlinked.
    pub fn new_element(&mut self, factory: &str, name: &str) -> Result<NodeId> {
        let handle = self
            .engine
            .create_element(factory, name)
            .map_err(|e| {
                tracing::error!(factory, name, error = %e, "element construction failed");
                Error::ConstructionFailure {
                    factory: factory.to_string(),
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
        Ok(self.insert(
            name,
            NodeKind::Element {
                factory: factory.to_string(),
            },
            handle,
        ))
    }

    /// Set a named attribute on a node's native object.
    ///
    /// The name must be part of the factory's property schema and the value
    /// must have the declared kind.
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let node = self.node(id)?;
        let value = value.into();
        tracing::debug!(node = %node.name, property = name, %value, "set attribute");
        self.engine.set_property(node.handle, name, &value)
    }

    /// Read back an attribute previously set on a node.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<PropertyValue> {
        let node = self.node(id).ok()?;
        self.engine.property(node.handle, name)
    }

    /// Expose the element's static pad `pad` as a ghost pad of the same name
    /// on its parent bin.
    pub fn add_ghost_pad_to_parent(&mut self, element: NodeId, pad: &str) -> Result<()> {
        let node = self.node(element)?;
        let ghost_failure = |reason: &str| Error::GhostPortFailure {
            element: node.name.clone(),
            pad: pad.to_string(),
            reason: reason.to_string(),
        };

        let Some(parent) = node.parent else {
            return Err(ghost_failure("element has no parent"));
        };
        if !self.engine.has_pad(node.handle, pad) {
            return Err(ghost_failure("no such static pad"));
        }
        let parent_node = self.node(parent)?;
        if let NodeKind::Bin { ghost_pads, .. } = &parent_node.kind
            && ghost_pads.iter().any(|(name, _)| name == pad)
        {
            return Err(ghost_failure("parent already exposes a pad with this name"));
        }
        if let Err(e) = self.engine.add_ghost_pad(parent_node.handle, node.handle, pad) {
            return Err(ghost_failure(&e.to_string()));
        }

        let element_name = node.name.clone();
        if let NodeKind::Bin { ghost_pads, .. } = &mut self.node_mut(parent)?.kind {
            ghost_pads.push((pad.to_string(), element));
        }
        tracing::debug!(element = %element_name, pad, "ghost pad added to parent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::element::{Caps, PropertyValue};
    use crate::engine::MemoryEngine;
    use crate::error::Error;
    use crate::graph::Graph;
    use std::sync::Arc;

    fn graph() -> (Arc<MemoryEngine>, Graph) {
        let engine = Arc::new(MemoryEngine::new());
        let graph = Graph::new(engine.clone());
        (engine, graph)
    }

    #[test]
    fn test_construction_failure() {
        let (engine, mut g) = graph();
        assert!(matches!(
            g.new_element("does-not-exist", "x"),
            Err(Error::ConstructionFailure { .. })
        ));
        engine.refuse_factory("nvinfer");
        assert!(matches!(
            g.new_element("nvinfer", "pgie"),
            Err(Error::ConstructionFailure { .. })
        ));
        assert!(g.is_empty());
    }

    #[test]
    fn test_set_attribute_kinds() {
        let (_engine, mut g) = graph();
        let filter = g.new_element("capsfilter", "filter").unwrap();
        let caps = Caps::nvmm_video(1280, 720, 30, 1);
        g.set_attribute(filter, "caps", caps.clone()).unwrap();
        assert_eq!(g.attribute(filter, "caps"), Some(PropertyValue::Caps(caps)));

        assert!(matches!(
            g.set_attribute(filter, "caps", 5u32),
            Err(Error::PropertyKind { .. })
        ));
        assert!(matches!(
            g.set_attribute(filter, "bogus", 5u32),
            Err(Error::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_ghost_pad_requires_parent() {
        let (_engine, mut g) = graph();
        let q = g.new_element("queue", "q").unwrap();
        assert!(matches!(
            g.add_ghost_pad_to_parent(q, "sink"),
            Err(Error::GhostPortFailure { .. })
        ));
    }

    #[test]
    fn test_ghost_pad_on_parent() {
        let (engine, mut g) = graph();
        let bin = g.new_bin("bin").unwrap();
        let q = g.new_element("queue", "q").unwrap();
        g.add_child(bin, q).unwrap();

        g.add_ghost_pad_to_parent(q, "sink").unwrap();
        assert_eq!(g.ghost_pads(bin), vec!["sink".to_string()]);
        assert_eq!(engine.ghost_pads(g.handle(bin).unwrap()), vec!["sink".to_string()]);

        assert!(matches!(
            g.add_ghost_pad_to_parent(q, "sink"),
            Err(Error::GhostPortFailure { .. })
        ));
        assert!(matches!(
            g.add_ghost_pad_to_parent(q, "nope"),
            Err(Error::GhostPortFailure { .. })
        ));
    }
}
