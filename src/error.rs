//! Error types for bingraph.

use thiserror::Error;

/// Result type alias using bingraph's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for graph, controller and registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The engine could not instantiate a native object.
    #[error("failed to construct '{name}' from factory '{factory}': {reason}")]
    ConstructionFailure {
        /// Factory the object was requested from.
        factory: String,
        /// Requested object name.
        name: String,
        /// Engine-provided reason.
        reason: String,
    },

    /// The node already has a peer on the side being linked.
    #[error("node '{0}' is already linked")]
    AlreadyLinked(String),

    /// The two nodes are not linked to each other.
    #[error("node '{src}' is not linked to '{sink}'")]
    NotLinked {
        /// Upstream node name.
        src: String,
        /// Downstream node name.
        sink: String,
    },

    /// A sibling with the same name already exists.
    #[error("container '{parent}' already has a child named '{name}'")]
    DuplicateName {
        /// Container name.
        parent: String,
        /// Colliding child name.
        name: String,
    },

    /// The engine refused to connect two native objects.
    #[error("failed to link '{src}' to '{sink}': {reason}")]
    LinkFailure {
        /// Upstream node name.
        src: String,
        /// Downstream node name.
        sink: String,
        /// Engine-provided reason.
        reason: String,
    },

    /// A ghost pad could not be exposed on the parent container.
    #[error("failed to add ghost pad '{pad}' for element '{element}': {reason}")]
    GhostPortFailure {
        /// Element owning the target pad.
        element: String,
        /// Pad name.
        pad: String,
        /// Reason.
        reason: String,
    },

    /// The node id is stale or was never issued by this graph.
    #[error("node not found")]
    NodeNotFound,

    /// A container operation was called on an element.
    #[error("node '{0}' is not a container")]
    NotABin(String),

    /// The node is not a child of the given container.
    #[error("node '{child}' is not a child of '{parent}'")]
    NotAChild {
        /// Container name.
        parent: String,
        /// Node name.
        child: String,
    },

    /// The node already belongs to a container.
    #[error("node '{0}' already has a parent")]
    HasParent(String),

    /// The node still has a source or sink.
    #[error("node '{0}' is still linked")]
    StillLinked(String),

    /// The container's children are linked; unlink them first.
    #[error("container '{0}' is linked")]
    BinLinked(String),

    /// The requested link or parent relation would create a cycle.
    #[error("linking '{src}' to '{sink}' would create a cycle")]
    WouldCycle {
        /// Upstream node name.
        src: String,
        /// Downstream node name.
        sink: String,
    },

    /// The engine knows no factory with this name.
    #[error("unknown element factory '{0}'")]
    UnknownFactory(String),

    /// The factory schema has no property with this name.
    #[error("'{factory}' has no property '{property}'")]
    UnknownProperty {
        /// Factory name.
        factory: String,
        /// Property name.
        property: String,
    },

    /// The property exists but expects a different value kind.
    #[error("property '{property}' expects a {expected} value")]
    PropertyKind {
        /// Property name.
        property: String,
        /// Expected kind label.
        expected: &'static str,
    },

    /// A configuration value is out of range.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A redaction class with this id is already registered.
    #[error("redaction class {0} already exists")]
    RedactionClassExists(i32),

    /// No redaction class with this id is registered.
    #[error("redaction class {0} not found")]
    RedactionClassNotFound(i32),

    /// Any other engine refusal.
    #[error("engine error: {0}")]
    Engine(String),

    /// No component with this name is registered.
    #[error("component '{0}' not found")]
    ComponentNotFound(String),

    /// A component with this name is already registered.
    #[error("component name '{0}' is not unique")]
    ComponentNameNotUnique(String),

    /// The component is owned by a pipeline.
    #[error("component '{0}' is in use")]
    ComponentInUse(String),

    /// No pipeline with this name is registered.
    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),

    /// A pipeline with this name is already registered.
    #[error("pipeline name '{0}' is not unique")]
    PipelineNameNotUnique(String),

    /// The listener is already registered.
    #[error("listener is not unique")]
    ListenerNotUnique,

    /// The listener is not registered.
    #[error("listener not found")]
    ListenerNotFound,
}
