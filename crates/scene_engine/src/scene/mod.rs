//! Scene graph
//!
//! Nodes live in a [`SceneGraph`] arena and are addressed by [`NodeId`].
//! Writes to live nodes are gated by the scene's [`UpdateHandler`]; bounds
//! are cached per node and recomputed lazily after invalidation.

mod billboard;
mod graph;
mod lod;
mod marker;
mod node;
mod update;

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

pub use billboard::{axis_rotation, facing_rotation, Billboard, BillboardMode, FacingRotation, ALIGNMENT_EPSILON};
pub use graph::{SceneGraph, UNBOUNDED_RADIUS};
pub use lod::{LodGroup, LodMode};
pub use marker::{MarkerGroup, MARKER_DISTANCE};
pub use node::{Capability, Group, Link, Node, NodeId, NodeKind, Shape, SharedGroup, TransformGroup};
pub use update::{UpdateHandler, UpdatePhase};

/// Scene graph shared between the application thread and render workers
pub type SharedScene = Arc<RwLock<SceneGraph>>;

/// Scene graph errors
///
/// All of these are contract violations by the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    /// Data write on a live node outside the update window
    #[error("Invalid write timing: node data may only change during the update phase")]
    InvalidWriteTiming,

    /// Bounds write on a live node outside the update window
    #[error("Invalid bounds timing: bounds may only change during the update phase")]
    InvalidBoundsTiming,

    /// Id not present in the arena
    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),

    /// Child operation on a node without children
    #[error("Node {0:?} cannot hold children")]
    NotAGroup(NodeId),

    /// Node already has a parent
    #[error("Node {0:?} already has a parent")]
    AlreadyParented(NodeId),

    /// The operation would make a node its own ancestor
    #[error("Operation would create a cycle")]
    CycleDetected,

    /// Child or threshold index past the end
    #[error("Index {index} out of range for length {len}")]
    ChildIndexOutOfRange {
        /// Offending index
        index: usize,
        /// Length at the time of the call
        len: usize,
    },

    /// LOD threshold that breaks increasing order
    #[error("LOD range {value} at index {index} is not between its neighbours")]
    InvalidLodRange {
        /// Threshold index
        index: usize,
        /// Rejected value
        value: f32,
    },

    /// Any other malformed argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// Create a scene graph ready to be shared with a pipeline manager
pub fn shared(scene: SceneGraph) -> SharedScene {
    Arc::new(RwLock::new(scene))
}
