//! Processing graph of elements and bins.
//!
//! Every node lives in one arena, a [`StableDiGraph`] whose edges are the
//! source/sink links between nodes. Parent/child membership is kept on the
//! node weights. Nodes are addressed by [`NodeId`], an arena index paired with
//! a generation, so an id that outlives its node is rejected instead of
//! silently addressing whatever reuses the slot.
//!
//! Element and bin specific operations live in [`element`] and [`bin`]; this
//! module holds the arena itself and the operations common to every node.

pub mod bin;
pub mod element;

use crate::element::PadDirection;
use crate::engine::{Engine, NativeHandle};
use crate::error::{Error, Result};
use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Graph shared between a registry and the controllers built on it.
pub type SharedGraph = Arc<Mutex<Graph>>;

/// Identifier of a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: NodeIndex,
    generation: u32,
}

impl NodeId {
    /// Arena slot of this node.
    pub fn index(&self) -> usize {
        self.index.index()
    }

    /// Generation of this node. Slots reused by later nodes get a new one.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index.index(), self.generation)
    }
}

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf processing unit instantiated from a factory.
    Element {
        /// Factory the element was created from.
        factory: String,
    },
    /// Container of other nodes.
    Bin {
        /// Whether this is the top-level container of a pipeline.
        root: bool,
        /// Set by a successful `link_all`, cleared by `unlink_all`.
        linked: bool,
        /// Ghost pads exposed on this bin, with the child backing each.
        ghost_pads: Vec<(String, NodeId)>,
    },
}

/// A node of the graph.
#[derive(Debug)]
pub struct Node {
    name: String,
    kind: NodeKind,
    handle: NativeHandle,
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    /// Name of this node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What this node is.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Native object owned by this node.
    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Factory name, for elements.
    pub fn factory(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { factory } => Some(factory),
            NodeKind::Bin { .. } => None,
        }
    }

    /// Check if this node is a bin.
    pub fn is_bin(&self) -> bool {
        matches!(self.kind, NodeKind::Bin { .. })
    }

    /// Parent bin.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children, in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A source/sink link between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    /// Name of the source pad.
    pub src_pad: String,
    /// Name of the sink pad.
    pub sink_pad: String,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            src_pad: "src".to_string(),
            sink_pad: "sink".to_string(),
        }
    }
}

impl Link {
    /// Create a link with specific pad names.
    pub fn with_pads(src_pad: impl Into<String>, sink_pad: impl Into<String>) -> Self {
        Self {
            src_pad: src_pad.into(),
            sink_pad: sink_pad.into(),
        }
    }
}

/// Arena of nodes backed by an [`Engine`].
///
/// Every node owns exactly one native object; it is released when the node
/// is destroyed or the graph is dropped.
pub struct Graph {
    engine: Arc<dyn Engine>,
    arena: StableDiGraph<Node, Link>,
    next_generation: u32,
}

impl Graph {
    /// Create an empty graph driving `engine`.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            arena: StableDiGraph::default(),
            next_generation: 0,
        }
    }

    /// Wrap this graph for sharing.
    pub fn into_shared(self) -> SharedGraph {
        Arc::new(Mutex::new(self))
    }

    /// The engine this graph drives.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.arena.node_count()
    }

    /// Check if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.arena.node_count() == 0
    }

    pub(crate) fn insert(&mut self, name: &str, kind: NodeKind, handle: NativeHandle) -> NodeId {
        self.next_generation = self.next_generation.wrapping_add(1);
        let generation = self.next_generation;
        let index = self.arena.add_node(Node {
            name: name.to_string(),
            kind,
            handle,
            generation,
            parent: None,
            children: Vec::new(),
        });
        tracing::debug!(node = name, %handle, "node created");
        NodeId { index, generation }
    }

    /// Check if `id` addresses a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena
            .node_weight(id.index)
            .is_some_and(|n| n.generation == id.generation)
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.arena
            .node_weight(id.index)
            .filter(|n| n.generation == id.generation)
            .ok_or(Error::NodeNotFound)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.arena
            .node_weight_mut(id.index)
            .filter(|n| n.generation == id.generation)
            .ok_or(Error::NodeNotFound)
    }

    fn id_of(&self, index: NodeIndex) -> Option<NodeId> {
        self.arena.node_weight(index).map(|n| NodeId {
            index,
            generation: n.generation,
        })
    }

    /// Name of a node.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).ok().map(Node::name)
    }

    /// Native object of a node.
    pub fn handle(&self, id: NodeId) -> Option<NativeHandle> {
        self.node(id).ok().map(Node::handle)
    }

    /// Parent bin of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(Node::parent)
    }

    /// Children of a bin, in insertion order. Empty for elements.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Find a direct child by name.
    pub fn child_by_name(&self, bin: NodeId, name: &str) -> Option<NodeId> {
        self.node(bin)
            .ok()?
            .children
            .iter()
            .copied()
            .find(|&c| self.name(c) == Some(name))
    }

    /// Downstream peer of a node.
    pub fn sink(&self, id: NodeId) -> Option<NodeId> {
        if !self.contains(id) {
            return None;
        }
        self.arena
            .edges_directed(id.index, Direction::Outgoing)
            .next()
            .and_then(|e| self.id_of(e.target()))
    }

    /// Upstream peer of a node.
    pub fn source(&self, id: NodeId) -> Option<NodeId> {
        if !self.contains(id) {
            return None;
        }
        self.arena
            .edges_directed(id.index, Direction::Incoming)
            .next()
            .and_then(|e| self.id_of(e.source()))
    }

    /// Check if a node has a downstream peer.
    pub fn is_linked_to_sink(&self, id: NodeId) -> bool {
        self.sink(id).is_some()
    }

    /// Check if a node has an upstream peer.
    pub fn is_linked_to_source(&self, id: NodeId) -> bool {
        self.source(id).is_some()
    }

    /// Pad names of the link leaving `id`, if any.
    pub fn sink_link(&self, id: NodeId) -> Option<&Link> {
        if !self.contains(id) {
            return None;
        }
        self.arena
            .edges_directed(id.index, Direction::Outgoing)
            .next()
            .map(|e| e.weight())
    }

    /// Link `src`'s output to `sink`'s input.
    ///
    /// The link is recorded first and the native link made second; if the
    /// engine refuses, the record is rolled back and [`Error::LinkFailure`]
    /// returned. The graph stays acyclic: a link that would let data loop
    /// back to `src` fails with [`Error::WouldCycle`].
    pub fn link_to_sink(&mut self, src: NodeId, sink: NodeId) -> Result<()> {
        let src_node = self.node(src)?;
        let sink_node = self.node(sink)?;
        let (src_name, sink_name) = (src_node.name.clone(), sink_node.name.clone());
        let (src_handle, sink_handle) = (src_node.handle, sink_node.handle);

        if self.is_linked_to_sink(src) {
            return Err(Error::AlreadyLinked(src_name));
        }
        if self.is_linked_to_source(sink) {
            return Err(Error::AlreadyLinked(sink_name));
        }
        if src == sink || has_path_connecting(&self.arena, sink.index, src.index, None) {
            return Err(Error::WouldCycle {
                src: src_name,
                sink: sink_name,
            });
        }

        let link = Link::with_pads(
            self.first_pad_name(src_handle, PadDirection::Output),
            self.first_pad_name(sink_handle, PadDirection::Input),
        );
        let edge = self.arena.add_edge(src.index, sink.index, link);

        if let Err(e) = self.engine.link(src_handle, sink_handle) {
            self.arena.remove_edge(edge);
            crate::observability::record_link_failure(&src_name, &sink_name);
            tracing::warn!(src = %src_name, sink = %sink_name, error = %e, "native link failed");
            return Err(Error::LinkFailure {
                src: src_name,
                sink: sink_name,
                reason: e.to_string(),
            });
        }

        tracing::debug!(src = %src_name, sink = %sink_name, "linked");
        Ok(())
    }

    fn first_pad_name(&self, handle: NativeHandle, direction: PadDirection) -> String {
        self.engine
            .first_pad(handle, direction)
            .unwrap_or_else(|| match direction {
                PadDirection::Output => "src".to_string(),
                PadDirection::Input => "sink".to_string(),
            })
    }

    /// Remove the link leaving `id`. No-op when it has no sink.
    pub fn unlink_from_sink(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        if let Some(sink) = self.sink(id) {
            self.remove_link(id, sink);
        }
        Ok(())
    }

    /// Remove the link entering `id`. No-op when it has no source.
    pub fn unlink_from_source(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        if let Some(src) = self.source(id) {
            self.remove_link(src, id);
        }
        Ok(())
    }

    /// Remove the link from `src` to `sink`. Fails with
    /// [`Error::NotLinked`] when the two are not linked to each other.
    pub fn unlink(&mut self, src: NodeId, sink: NodeId) -> Result<()> {
        let src_name = self.node(src)?.name.clone();
        let sink_name = self.node(sink)?.name.clone();
        if self.sink(src) != Some(sink) {
            return Err(Error::NotLinked {
                src: src_name,
                sink: sink_name,
            });
        }
        self.remove_link(src, sink);
        Ok(())
    }

    fn remove_link(&mut self, src: NodeId, sink: NodeId) {
        let (Some(src_handle), Some(sink_handle)) = (self.handle(src), self.handle(sink)) else {
            return;
        };
        self.engine.unlink(src_handle, sink_handle);
        if let Some(edge) = self.arena.find_edge(src.index, sink.index) {
            self.arena.remove_edge(edge);
        }
        tracing::debug!(
            src = self.name(src).unwrap_or_default(),
            sink = self.name(sink).unwrap_or_default(),
            "unlinked"
        );
    }

    /// Destroy a node and release its native object.
    ///
    /// The node must have no parent and no links. A bin must not be linked;
    /// its children are destroyed with it, and none of them may be linked
    /// either.
    pub fn destroy(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        if node.parent.is_some() {
            return Err(Error::HasParent(node.name.clone()));
        }

        let mut doomed = Vec::new();
        self.collect_subtree(id, &mut doomed);
        for &member in &doomed {
            let member_node = self.node(member)?;
            if self.is_linked_to_sink(member) || self.is_linked_to_source(member) {
                return Err(Error::StillLinked(member_node.name.clone()));
            }
            if let NodeKind::Bin { linked: true, .. } = member_node.kind {
                return Err(Error::BinLinked(member_node.name.clone()));
            }
        }

        // Children before their parents.
        for member in doomed {
            if let Some(node) = self.arena.remove_node(member.index) {
                self.engine.release(node.handle);
                tracing::debug!(node = %node.name, "node destroyed");
            }
        }
        Ok(())
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for child in self.children(id) {
            self.collect_subtree(child, out);
        }
        out.push(id);
    }

    /// Ids of every live node.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.arena
            .node_indices()
            .filter_map(|i| self.id_of(i))
            .collect()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.arena.node_count())
            .field("links", &self.arena.edge_count())
            .finish()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        for index in self.arena.node_indices().collect::<Vec<_>>() {
            if let Some(node) = self.arena.remove_node(index) {
                self.engine.release(node.handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    fn graph() -> (Arc<MemoryEngine>, Graph) {
        let engine = Arc::new(MemoryEngine::new());
        let graph = Graph::new(engine.clone());
        (engine, graph)
    }

    #[test]
    fn test_link_sets_both_sides() {
        let (engine, mut g) = graph();
        let a = g.new_element("queue", "a").unwrap();
        let b = g.new_element("queue", "b").unwrap();

        g.link_to_sink(a, b).unwrap();
        assert_eq!(g.sink(a), Some(b));
        assert_eq!(g.source(b), Some(a));
        assert!(engine.is_linked(g.handle(a).unwrap(), g.handle(b).unwrap()));
        assert_eq!(g.sink_link(a).unwrap().src_pad, "src");

        assert_eq!(
            g.link_to_sink(a, b).unwrap_err(),
            Error::AlreadyLinked("a".to_string())
        );
    }

    #[test]
    fn test_link_records_native_pad_names() {
        use crate::element::{PadPresence, PadTemplate};
        use crate::engine::{ElementSpec, FactoryCatalog, MemoryEngineConfig};

        let mut catalog = FactoryCatalog::new();
        catalog.register(ElementSpec::new("demux").with_pad(PadTemplate::new(
            "video_0",
            PadDirection::Output,
            PadPresence::Always,
        )));
        catalog.register(ElementSpec::new("mux").with_pad(PadTemplate::new(
            "in_0",
            PadDirection::Input,
            PadPresence::Always,
        )));
        let engine = MemoryEngine::with_config(catalog, MemoryEngineConfig::default());
        let mut g = Graph::new(Arc::new(engine));
        let demux = g.new_element("demux", "demux").unwrap();
        let mux = g.new_element("mux", "mux").unwrap();

        g.link_to_sink(demux, mux).unwrap();
        let link = g.sink_link(demux).unwrap();
        assert_eq!(link.src_pad, "video_0");
        assert_eq!(link.sink_pad, "in_0");
    }

    #[test]
    fn test_link_rejects_cycles() {
        let (_engine, mut g) = graph();
        let a = g.new_element("queue", "a").unwrap();
        let b = g.new_element("queue", "b").unwrap();
        let c = g.new_element("queue", "c").unwrap();

        assert!(matches!(g.link_to_sink(a, a), Err(Error::WouldCycle { .. })));
        g.link_to_sink(a, b).unwrap();
        g.link_to_sink(b, c).unwrap();
        assert!(matches!(g.link_to_sink(c, a), Err(Error::WouldCycle { .. })));
    }

    #[test]
    fn test_native_failure_rolls_back() {
        let (engine, mut g) = graph();
        let a = g.new_element("queue", "a").unwrap();
        let b = g.new_element("queue", "b").unwrap();
        engine.refuse_link("a", "b");

        assert!(matches!(g.link_to_sink(a, b), Err(Error::LinkFailure { .. })));
        assert!(!g.is_linked_to_sink(a));
        assert!(!g.is_linked_to_source(b));
    }

    #[test]
    fn test_unlink_variants() {
        let (engine, mut g) = graph();
        let a = g.new_element("queue", "a").unwrap();
        let b = g.new_element("queue", "b").unwrap();

        g.unlink_from_sink(a).unwrap();
        assert!(matches!(g.unlink(a, b), Err(Error::NotLinked { .. })));

        g.link_to_sink(a, b).unwrap();
        g.unlink_from_source(b).unwrap();
        assert!(!g.is_linked_to_sink(a));
        assert!(!engine.is_linked(g.handle(a).unwrap(), g.handle(b).unwrap()));

        g.link_to_sink(a, b).unwrap();
        g.unlink(a, b).unwrap();
        assert_eq!(g.sink(a), None);
    }

    #[test]
    fn test_stale_id_rejected() {
        let (_engine, mut g) = graph();
        let a = g.new_element("queue", "a").unwrap();
        g.destroy(a).unwrap();
        let b = g.new_element("queue", "b").unwrap();

        assert_eq!(a.index(), b.index());
        assert!(!g.contains(a));
        assert_eq!(g.node(a).unwrap_err(), Error::NodeNotFound);
        assert_eq!(g.name(b), Some("b"));
    }

    #[test]
    fn test_destroy_requires_detached_node() {
        let (engine, mut g) = graph();
        let a = g.new_element("queue", "a").unwrap();
        let b = g.new_element("queue", "b").unwrap();
        g.link_to_sink(a, b).unwrap();

        assert_eq!(g.destroy(a).unwrap_err(), Error::StillLinked("a".to_string()));
        g.unlink(a, b).unwrap();
        g.destroy(a).unwrap();
        assert_eq!(engine.object_count(), 1);
    }

    #[test]
    fn test_drop_releases_native_objects() {
        let engine = Arc::new(MemoryEngine::new());
        {
            let mut g = Graph::new(engine.clone());
            let bin = g.new_bin("bin").unwrap();
            let q = g.new_element("queue", "q").unwrap();
            g.add_child(bin, q).unwrap();
            assert_eq!(engine.object_count(), 2);
        }
        assert_eq!(engine.object_count(), 0);
    }
}
