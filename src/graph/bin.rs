//! Bin nodes: ordered containers aggregated into one native sub-graph.

use super::{Graph, NodeId, NodeKind};
use crate::error::{Error, Result};

impl Graph {
    /// Create an empty bin.
    pub fn new_bin(&mut self, name: &str) -> Result<NodeId> {
        let handle = self
            .engine
            .create_bin(name)
            .map_err(|e| construction_failure("bin", name, e))?;
        Ok(self.insert(name, bin_kind(false), handle))
    }

    /// Create the top-level bin of a pipeline, backed by a native pipeline.
    pub fn new_pipeline_bin(&mut self, name: &str) -> Result<NodeId> {
        let handle = self
            .engine
            .create_pipeline(name)
            .map_err(|e| construction_failure("pipeline", name, e))?;
        Ok(self.insert(name, bin_kind(true), handle))
    }

    fn bin_name(&self, bin: NodeId) -> Result<String> {
        let node = self.node(bin)?;
        if !node.is_bin() {
            return Err(Error::NotABin(node.name.clone()));
        }
        Ok(node.name.clone())
    }

    /// Add `child` to `bin`, both structurally and as a native bin member.
    ///
    /// Either everything is recorded or nothing is.
    pub fn add_child(&mut self, bin: NodeId, child: NodeId) -> Result<()> {
        let bin_name = self.bin_name(bin)?;
        let child_node = self.node(child)?;
        let child_name = child_node.name.clone();

        if child_node.parent.is_some() {
            return Err(Error::HasParent(child_name));
        }
        if bin == child || self.is_ancestor(child, bin) {
            return Err(Error::WouldCycle {
                src: bin_name,
                sink: child_name,
            });
        }
        if self.child_by_name(bin, &child_name).is_some() {
            return Err(Error::DuplicateName {
                parent: bin_name,
                name: child_name,
            });
        }
        if self.is_linked(bin) {
            return Err(Error::BinLinked(bin_name));
        }
        if self.is_linked_to_sink(child) || self.is_linked_to_source(child) {
            return Err(Error::StillLinked(child_name));
        }

        let (bin_handle, child_handle) = (self.node(bin)?.handle, child_node.handle);
        self.engine.bin_add(bin_handle, child_handle)?;

        self.node_mut(child)?.parent = Some(bin);
        self.node_mut(bin)?.children.push(child);
        tracing::debug!(bin = %bin_name, child = %child_name, "child added");
        Ok(())
    }

    /// Remove `child` from `bin`.
    ///
    /// Ghost pads the child backs on `bin` are removed first.
    pub fn remove_child(&mut self, bin: NodeId, child: NodeId) -> Result<()> {
        let bin_name = self.bin_name(bin)?;
        let child_node = self.node(child)?;
        let child_name = child_node.name.clone();

        if child_node.parent != Some(bin) {
            return Err(Error::NotAChild {
                parent: bin_name,
                child: child_name,
            });
        }
        if self.is_linked(bin) {
            return Err(Error::BinLinked(bin_name));
        }
        if self.is_linked_to_sink(child) || self.is_linked_to_source(child) {
            return Err(Error::StillLinked(child_name));
        }

        let bin_handle = self.node(bin)?.handle;
        let child_handle = child_node.handle;
        for pad in self.ghost_pads_backed_by(bin, child) {
            self.engine.remove_ghost_pad(bin_handle, &pad)?;
            if let NodeKind::Bin { ghost_pads, .. } = &mut self.node_mut(bin)?.kind {
                ghost_pads.retain(|(name, _)| *name != pad);
            }
        }
        self.engine.bin_remove(bin_handle, child_handle)?;

        self.node_mut(child)?.parent = None;
        self.node_mut(bin)?.children.retain(|&c| c != child);
        tracing::debug!(bin = %bin_name, child = %child_name, "child removed");
        Ok(())
    }

    fn ghost_pads_backed_by(&self, bin: NodeId, child: NodeId) -> Vec<String> {
        match self.node(bin).map(|n| &n.kind) {
            Ok(NodeKind::Bin { ghost_pads, .. }) => ghost_pads
                .iter()
                .filter(|(_, backing)| *backing == child)
                .map(|(name, _)| name.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut current = self.parent(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Names of the ghost pads a bin exposes.
    pub fn ghost_pads(&self, bin: NodeId) -> Vec<String> {
        match self.node(bin).map(|n| &n.kind) {
            Ok(NodeKind::Bin { ghost_pads, .. }) => {
                ghost_pads.iter().map(|(name, _)| name.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Check if a bin's children are linked into a chain.
    pub fn is_linked(&self, bin: NodeId) -> bool {
        matches!(
            self.node(bin).map(|n| &n.kind),
            Ok(NodeKind::Bin { linked: true, .. })
        )
    }

    /// Link the children of `bin` into a chain, in insertion order.
    ///
    /// Child bins that are not linked yet are linked first. Returns `false`
    /// if the bin is already linked or on the first failure; a failure can
    /// leave a partial chain behind that [`Graph::unlink_all`] removes. An
    /// empty bin links trivially.
    pub fn link_all(&mut self, bin: NodeId) -> bool {
        let Ok(bin_name) = self.bin_name(bin) else {
            return false;
        };
        if self.is_linked(bin) {
            tracing::warn!(bin = %bin_name, "bin is already linked");
            return false;
        }

        let children = self.children(bin);
        for &child in &children {
            let is_bin = self.node(child).is_ok_and(|n| n.is_bin());
            if is_bin && !self.is_linked(child) && !self.link_all(child) {
                tracing::error!(bin = %bin_name, "failed to link a child bin");
                return false;
            }
        }
        for pair in children.windows(2) {
            if let Err(e) = self.link_to_sink(pair[0], pair[1]) {
                tracing::error!(bin = %bin_name, error = %e, "link_all stopped");
                return false;
            }
        }

        if let Ok(node) = self.node_mut(bin)
            && let NodeKind::Bin { linked, .. } = &mut node.kind
        {
            *linked = true;
        }
        tracing::debug!(bin = %bin_name, children = children.len(), "all children linked");
        true
    }

    /// Unlink the children of `bin`, last pair first, then the insides of
    /// child bins. Nothing happens for a bin with no links.
    pub fn unlink_all(&mut self, bin: NodeId) {
        let Ok(bin_name) = self.bin_name(bin) else {
            return;
        };

        let children = self.children(bin);
        for pair in children.windows(2).rev() {
            if self.sink(pair[0]) == Some(pair[1]) {
                let _ = self.unlink(pair[0], pair[1]);
            }
        }
        for &child in &children {
            if self.node(child).is_ok_and(|n| n.is_bin()) {
                self.unlink_all(child);
            }
        }

        if let Ok(node) = self.node_mut(bin)
            && let NodeKind::Bin { linked, .. } = &mut node.kind
            && *linked
        {
            *linked = false;
            tracing::debug!(bin = %bin_name, "all children unlinked");
        }
    }

    /// Add `child` to `parent`, logging instead of failing. Returns `false`
    /// when nothing was added.
    pub fn add_to_parent(&mut self, child: NodeId, parent: NodeId) -> bool {
        match self.add_child(parent, child) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "add to parent failed");
                false
            }
        }
    }

    /// Remove `child` from its parent, logging instead of failing. Returns
    /// `false` when nothing was removed.
    pub fn remove_from_parent(&mut self, child: NodeId) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        match self.remove_child(parent, child) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "remove from parent failed");
                false
            }
        }
    }
}

fn bin_kind(root: bool) -> NodeKind {
    NodeKind::Bin {
        root,
        linked: false,
        ghost_pads: Vec::new(),
    }
}

fn construction_failure(factory: &str, name: &str, e: Error) -> Error {
    tracing::error!(factory, name, error = %e, "container construction failed");
    Error::ConstructionFailure {
        factory: factory.to_string(),
        name: name.to_string(),
        reason: e.to_string(),
    }
}
