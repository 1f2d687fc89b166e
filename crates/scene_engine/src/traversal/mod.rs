//! Traversal contract shared by the cull and pick passes
//!
//! Standard nodes are walked by the traversal itself. Custom nodes
//! (billboards, LOD groups, marker groups) implement [`CustomCullable`] and
//! [`CustomPickTarget`]: they run their own frustum or pick test and fill an
//! [`Instructions`] slot with the children to continue into and, optionally,
//! a replacement local transform.
//!
//! Slots come from an [`InstructionArena`] owned by the traversal, indexed by
//! recursion depth and reused frame to frame.

use crate::bounds::{Frustum, FrustumIntersection};
use crate::foundation::math::{Mat4, Vec3};
use crate::pick::{PickError, PickRequest};
use crate::scene::{Node, NodeId, SceneGraph};

/// Children to visit below a custom node, plus an optional transform override
#[derive(Debug, Clone)]
pub struct Instructions {
    children: Vec<NodeId>,
    has_transform: bool,
    transform: Mat4,
}

/// Output of [`CustomCullable::cull_children`]
pub type CullInstructions = Instructions;

/// Output of [`CustomPickTarget::pick_children`]
pub type PickInstructions = Instructions;

impl Default for Instructions {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            has_transform: false,
            transform: Mat4::identity(),
        }
    }
}

impl Instructions {
    /// Clear for reuse, keeping the child buffer's capacity
    pub fn reset(&mut self) {
        self.children.clear();
        self.has_transform = false;
        self.transform = Mat4::identity();
    }

    /// Continue traversal into `child`
    pub fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    /// Continue traversal into every child in order
    pub fn add_children(&mut self, children: &[NodeId]) {
        self.children.extend_from_slice(children);
    }

    /// Replace the node's local transform for this traversal
    pub fn set_transform(&mut self, transform: Mat4) {
        self.has_transform = true;
        self.transform = transform;
    }

    /// Children to visit
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether a local transform override applies
    pub fn has_transform(&self) -> bool {
        self.has_transform
    }

    /// The local transform override, if any
    pub fn transform(&self) -> Option<&Mat4> {
        self.has_transform.then_some(&self.transform)
    }
}

/// Instruction slots indexed by traversal depth
#[derive(Debug, Default)]
pub struct InstructionArena {
    slots: Vec<Instructions>,
}

impl InstructionArena {
    /// Pre-size the arena for `depth` nested custom nodes
    pub fn with_depth(depth: usize) -> Self {
        Self {
            slots: (0..depth).map(|_| Instructions::default()).collect(),
        }
    }

    /// Number of allocated slots
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// A cleared slot for `depth`, growing the arena when the graph is
    /// deeper than any seen before
    pub fn slot(&mut self, depth: usize) -> &mut Instructions {
        if depth >= self.slots.len() {
            self.slots.resize_with(depth + 1, Instructions::default);
        }
        let slot = &mut self.slots[depth];
        slot.reset();
        slot
    }

    /// Read a slot filled earlier in the same traversal
    pub fn get(&self, depth: usize) -> Option<&Instructions> {
        self.slots.get(depth)
    }

    /// Clear every slot between frames
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(Instructions::reset);
    }
}

/// Viewer parameters seen by custom nodes
#[derive(Debug, Clone)]
pub struct ViewParams {
    /// World-space viewpoint
    pub position: Vec3,
    /// Horizontal field of view in radians
    pub field_of_view: f32,
    /// Viewport width in pixels
    pub viewport_width: u32,
    /// Frustum for culling; `None` during picking
    pub frustum: Option<Frustum>,
}

impl ViewParams {
    /// Radians covered by one pixel
    pub fn angular_resolution(&self) -> f32 {
        self.field_of_view / self.viewport_width.max(1) as f32
    }
}

/// What a custom node sees when asked for its children
pub struct TraversalContext<'a> {
    /// Scene being traversed
    pub scene: &'a SceneGraph,
    /// The node being asked
    pub node: NodeId,
    /// Transform from the node's parent frame to world space
    pub world_transform: Mat4,
    /// Viewer
    pub view: &'a ViewParams,
}

impl TraversalContext<'_> {
    /// Test the node's cached bounds against the frustum
    ///
    /// `Partial` when no frustum is set, and in place of `AllOut` for a
    /// node with a marker group below it.
    pub fn test_bounds(&self, node: &Node) -> FrustumIntersection {
        match &self.view.frustum {
            Some(frustum) => match node.bounds.cached.check_intersection_frustum(frustum, &self.world_transform) {
                FrustumIntersection::AllOut if node.contains_marker() => FrustumIntersection::Partial,
                intersection => intersection,
            },
            None => FrustumIntersection::Partial,
        }
    }

    /// Viewpoint expressed in the node's parent frame
    ///
    /// Falls back to the world position when the accumulated transform is
    /// singular.
    pub fn local_viewpoint(&self) -> Vec3 {
        self.world_transform
            .try_inverse()
            .map_or(self.view.position, |inverse| {
                inverse.transform_point(&self.view.position.into()).coords
            })
    }
}

/// Node that decides its own cull traversal
pub trait CustomCullable {
    /// Run the node's frustum test and fill `out` with the children to
    /// visit. Returning [`FrustumIntersection::AllOut`] prunes the node.
    fn cull_children(&self, node: &Node, ctx: &TraversalContext<'_>, out: &mut CullInstructions) -> FrustumIntersection;
}

/// Node that decides its own pick traversal
pub trait CustomPickTarget {
    /// Fill `out` with the children a pick should continue into, using the
    /// transform rendering would use from the request's viewpoint.
    ///
    /// Fails with [`PickError::InvalidPickTiming`] outside the picking
    /// window and [`PickError::NotPickable`] for an empty request mask.
    fn pick_children(
        &self,
        node: &Node,
        ctx: &TraversalContext<'_>,
        request: &PickRequest,
        out: &mut PickInstructions,
    ) -> Result<(), PickError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_arena_grows_and_resets_slots() {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        let child = keys.insert(());

        let mut arena = InstructionArena::with_depth(2);
        assert_eq!(arena.depth(), 2);

        let slot = arena.slot(4);
        slot.add_child(child);
        slot.set_transform(Mat4::new_scaling(2.0));
        assert_eq!(arena.depth(), 5);
        assert_eq!(arena.get(4).unwrap().children(), &[child]);

        let reused = arena.slot(4);
        assert!(reused.children().is_empty());
        assert!(!reused.has_transform());
        assert!(reused.transform().is_none());
    }
}
