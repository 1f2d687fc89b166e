//! Marker groups: children floated between the viewer and a tracked node
//!
//! Every frame the group finds the world position of its target, places its
//! children [`MARKER_DISTANCE`] units from the viewer along the line of
//! sight to that position and turns them to face the viewer.
//!
//! The target's world transform is found by walking up from the target. A
//! shared group reached on the way is left through its first registered
//! link only, so a target under a multiply-linked shared group is tracked
//! through that one instance.

use crate::bounds::{BoundingVolume, FrustumIntersection};
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::pick::{PickError, PickRequest};
use crate::scene::billboard::facing_rotation;
use crate::scene::node::Group;
use crate::scene::{Node, NodeId};
use crate::traversal::{
    CullInstructions, CustomCullable, CustomPickTarget, PickInstructions, TraversalContext,
};

/// Distance from the viewer at which marker children are placed
pub const MARKER_DISTANCE: f32 = 2.0;

/// Group that keeps its children in front of the viewer, over a target
#[derive(Debug, Clone)]
pub struct MarkerGroup {
    pub(crate) group: Group,
    target: Option<NodeId>,
    enabled: bool,
}

impl Default for MarkerGroup {
    fn default() -> Self {
        Self {
            group: Group::default(),
            target: None,
            enabled: true,
        }
    }
}

impl MarkerGroup {
    /// Create an enabled marker with no target
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracked node
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub(crate) fn set_target(&mut self, target: Option<NodeId>) {
        self.target = target;
    }

    /// Whether the marker is shown
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// World-space placement of the children for the viewer in `ctx`
    ///
    /// `None` when the marker shows nothing this frame: disabled, no
    /// target, a target no longer in the scene, or a viewer standing on the
    /// target.
    pub fn world_placement(&self, ctx: &TraversalContext<'_>) -> Option<Mat4> {
        if !self.enabled {
            return None;
        }
        let target = self.target?;
        let target_frame = ctx.scene.parent_to_world(target).ok()?;
        let local_center = ctx
            .scene
            .cached_bounds(target)
            .and_then(BoundingVolume::center)
            .unwrap_or_else(Vec3::zeros);
        let target_position = target_frame.transform_point(&Point3::from(local_center)).coords;

        let eye = ctx.view.position;
        let direction = (target_position - eye).try_normalize(f32::EPSILON)?;
        let position = eye + direction * MARKER_DISTANCE;
        let rotation = facing_rotation(eye - position, Vec3::y());

        Some(Mat4::new_translation(&position) * rotation.matrix)
    }

    /// Local transform overriding the node's identity, relative to its parent
    fn local_placement(&self, ctx: &TraversalContext<'_>) -> Option<(Mat4, Mat4)> {
        let world = self.world_placement(ctx)?;
        let inverse_parent = ctx.world_transform.try_inverse()?;
        Some((world, inverse_parent * world))
    }
}

impl CustomCullable for MarkerGroup {
    fn cull_children(&self, _node: &Node, ctx: &TraversalContext<'_>, out: &mut CullInstructions) -> FrustumIntersection {
        let Some((world, local)) = self.local_placement(ctx) else {
            return FrustumIntersection::AllOut;
        };

        let intersection = match &ctx.view.frustum {
            Some(frustum) => self
                .group
                .children
                .iter()
                .filter_map(|child| ctx.scene.cached_bounds(*child))
                .fold(BoundingVolume::Void, |acc, bounds| acc.merge(bounds))
                .check_intersection_frustum(frustum, &world),
            None => FrustumIntersection::Partial,
        };
        if intersection == FrustumIntersection::AllOut {
            return intersection;
        }

        out.set_transform(local);
        out.add_children(self.group.children());
        intersection
    }
}

impl CustomPickTarget for MarkerGroup {
    fn pick_children(
        &self,
        _node: &Node,
        ctx: &TraversalContext<'_>,
        request: &PickRequest,
        out: &mut PickInstructions,
    ) -> Result<(), PickError> {
        ctx.scene.check_picking(request.mask)?;
        if let Some((_, local)) = self.local_placement(ctx) {
            out.set_transform(local);
            out.add_children(self.group.children());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NodeKind, SceneGraph};
    use crate::traversal::ViewParams;
    use approx::assert_relative_eq;

    fn view_at(position: Vec3) -> ViewParams {
        ViewParams {
            position,
            field_of_view: std::f32::consts::FRAC_PI_2,
            viewport_width: 800,
            frustum: None,
        }
    }

    fn scene_with_target(at: Vec3) -> (SceneGraph, NodeId, NodeId) {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let mover = scene.create_transform_group(Mat4::new_translation(&at));
        let target = scene.create_group();
        let marker = scene.create_marker();
        scene.add_child(root, mover).unwrap();
        scene.add_child(mover, target).unwrap();
        scene.add_child(root, marker).unwrap();
        scene.set_marker_target(marker, Some(target)).unwrap();
        (scene, marker, target)
    }

    fn marker_of(scene: &SceneGraph, id: NodeId) -> &MarkerGroup {
        match scene.node(id).unwrap().kind() {
            NodeKind::MarkerGroup(marker) => marker,
            other => panic!("expected marker, found {}", other.type_name()),
        }
    }

    #[test]
    fn test_marker_sits_between_viewer_and_target() {
        let (scene, marker, _) = scene_with_target(Vec3::new(0.0, 0.0, -10.0));
        let view = view_at(Vec3::zeros());
        let ctx = TraversalContext { scene: &scene, node: marker, world_transform: Mat4::identity(), view: &view };

        let placement = marker_of(&scene, marker).world_placement(&ctx).unwrap();
        let origin = placement.transform_point(&Point3::origin()).coords;
        assert_relative_eq!(origin, Vec3::new(0.0, 0.0, -MARKER_DISTANCE), epsilon = 1e-5);

        // local +Z faces back toward the viewer
        let facing = placement.transform_vector(&Vec3::z());
        assert_relative_eq!(facing, Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_disabled_or_untargeted_marker_shows_nothing() {
        let (mut scene, marker, _) = scene_with_target(Vec3::new(5.0, 0.0, 0.0));
        let child = scene.create_group();
        scene.add_child(marker, child).unwrap();
        scene.set_marker_enabled(marker, false).unwrap();

        let view = view_at(Vec3::zeros());
        let ctx = TraversalContext { scene: &scene, node: marker, world_transform: Mat4::identity(), view: &view };
        let node = scene.node(marker).unwrap();
        let mut out = CullInstructions::default();
        assert_eq!(marker_of(&scene, marker).cull_children(node, &ctx, &mut out), FrustumIntersection::AllOut);
        assert!(out.children().is_empty());

        scene.set_marker_enabled(marker, true).unwrap();
        scene.set_marker_target(marker, None).unwrap();
        let ctx = TraversalContext { scene: &scene, node: marker, world_transform: Mat4::identity(), view: &view };
        assert!(marker_of(&scene, marker).world_placement(&ctx).is_none());
    }

    #[test]
    fn test_viewer_on_target_is_degenerate() {
        let (scene, marker, _) = scene_with_target(Vec3::new(1.0, 2.0, 3.0));
        let view = view_at(Vec3::new(1.0, 2.0, 3.0));
        let ctx = TraversalContext { scene: &scene, node: marker, world_transform: Mat4::identity(), view: &view };
        assert!(marker_of(&scene, marker).world_placement(&ctx).is_none());
    }
}
