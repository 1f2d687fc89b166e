//! # Cull Stage
//!
//! Walks the scene graph from the root for one viewpoint and collects the
//! potentially visible renderables with their accumulated world transforms.
//!
//! - Void bounds prune a subtree, unless a marker group sits below it.
//! - `AllOut` prunes a subtree; `AllIn` stops frustum tests below the node.
//! - Standard groups visit every child under their own transform.
//! - Custom nodes choose their children and may replace their transform.
//! - Links continue into their shared group.
//!
//! Output order is traversal order; the sort stage decides draw order.

use std::sync::Arc;

use log::{debug, warn};

use crate::bounds::{BoundingVolume, FrustumIntersection};
use crate::core::config::CullingConfig;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::render::Renderable;
use crate::scene::{Capability, NodeId, NodeKind, SceneGraph};
use crate::traversal::{InstructionArena, TraversalContext, ViewParams};

/// A visible renderable
#[derive(Clone)]
pub struct CulledRenderable {
    /// Shape node it came from
    pub node: NodeId,
    /// What to draw
    pub renderable: Arc<dyn Renderable>,
    /// Local-to-world transform
    pub world_transform: Mat4,
    /// World-space center of its bounds
    pub world_center: Vec3,
    /// Render-order hint
    pub render_order: i32,
    /// Whether it belongs to the transparent pass
    pub transparent: bool,
}

impl std::fmt::Debug for CulledRenderable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CulledRenderable")
            .field("node", &self.node)
            .field("renderable", &self.renderable.name())
            .field("render_order", &self.render_order)
            .field("transparent", &self.transparent)
            .finish()
    }
}

/// Renderables found by one cull, in traversal order
#[derive(Debug, Clone, Default)]
pub struct CullOutput {
    /// Visible renderables
    pub entries: Vec<CulledRenderable>,
    /// Nodes visited, for statistics
    pub visited: usize,
}

impl CullOutput {
    /// Empty the output for reuse
    pub fn clear(&mut self) {
        self.entries.clear();
        self.visited = 0;
    }

    /// Number of visible renderables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is visible
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shape nodes in output order
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|entry| entry.node)
    }
}

/// Strategy deciding what a viewpoint can see
pub trait Culler: Send {
    /// Replace `out` with the renderables visible from `view`
    fn cull(&mut self, scene: &SceneGraph, view: &ViewParams, out: &mut CullOutput);
}

/// Culler testing node bounds against the view frustum
#[derive(Debug)]
pub struct FrustumCuller {
    arena: InstructionArena,
    frustum_culling: bool,
}

impl Default for FrustumCuller {
    fn default() -> Self {
        Self::new(&CullingConfig::default())
    }
}

impl FrustumCuller {
    /// Create a culler
    pub fn new(config: &CullingConfig) -> Self {
        Self {
            arena: InstructionArena::with_depth(config.initial_instruction_depth),
            frustum_culling: config.enable_frustum_culling,
        }
    }
}

/// Views shared by one traversal: with and without frustum tests
struct CullViews<'a> {
    testing: &'a ViewParams,
    accepted: &'a ViewParams,
}

impl Culler for FrustumCuller {
    fn cull(&mut self, scene: &SceneGraph, view: &ViewParams, out: &mut CullOutput) {
        out.clear();
        self.arena.reset();
        if scene.bounds_dirty() {
            warn!("Culling a scene whose bounds were not refreshed");
        }

        let accepted = ViewParams { frustum: None, ..view.clone() };
        let views = CullViews { testing: view, accepted: &accepted };
        let test = self.frustum_culling && view.frustum.is_some();
        self.visit(scene, scene.root(), Mat4::identity(), 0, test, &views, out);
        debug!("Culled {} renderables from {} nodes", out.entries.len(), out.visited);
    }
}

impl FrustumCuller {
    #[allow(clippy::too_many_arguments)]
    fn visit(
        &mut self,
        scene: &SceneGraph,
        id: NodeId,
        parent_world: Mat4,
        depth: usize,
        mut test: bool,
        views: &CullViews<'_>,
        out: &mut CullOutput,
    ) {
        let Some(node) = scene.get(id) else {
            return;
        };
        out.visited += 1;
        let bounds = &node.bounds.cached;
        let pinned = node.contains_marker();
        if bounds.is_void() && !pinned {
            return;
        }

        match node.capability() {
            Capability::Leaf => {
                if test && classify(bounds, views, &parent_world) == FrustumIntersection::AllOut {
                    return;
                }
                if let NodeKind::Shape(shape) = node.kind() {
                    let center = bounds.center().unwrap_or_else(Vec3::zeros);
                    out.entries.push(CulledRenderable {
                        node: id,
                        renderable: Arc::clone(shape.renderable()),
                        world_transform: parent_world,
                        world_center: parent_world.transform_point(&Point3::from(center)).coords,
                        render_order: shape.render_order(),
                        transparent: shape.is_transparent(),
                    });
                }
            }
            Capability::Link => {
                if test {
                    match classify(bounds, views, &parent_world) {
                        FrustumIntersection::AllOut if !pinned => return,
                        FrustumIntersection::AllIn => test = false,
                        FrustumIntersection::AllOut | FrustumIntersection::Partial => {}
                    }
                }
                if let NodeKind::Link(link) = node.kind() {
                    if let Some(target) = link.target() {
                        self.visit(scene, target, parent_world, depth + 1, test, views, out);
                    }
                }
            }
            Capability::Standard => {
                if test {
                    match classify(bounds, views, &parent_world) {
                        FrustumIntersection::AllOut if !pinned => return,
                        FrustumIntersection::AllIn => test = false,
                        FrustumIntersection::AllOut | FrustumIntersection::Partial => {}
                    }
                }
                let world = node.kind().local_transform().map_or(parent_world, |local| parent_world * local);
                for child in node.children() {
                    self.visit(scene, *child, world, depth + 1, test, views, out);
                }
            }
            Capability::Custom => {
                let Some(cullable) = node.kind().as_custom_cullable() else {
                    return;
                };
                let view = if test { views.testing } else { views.accepted };
                let ctx = TraversalContext { scene, node: id, world_transform: parent_world, view };
                let slot = self.arena.slot(depth);
                match cullable.cull_children(node, &ctx, slot) {
                    FrustumIntersection::AllOut => return,
                    FrustumIntersection::AllIn => test = false,
                    FrustumIntersection::Partial => {}
                }
                let world = slot.transform().map_or(parent_world, |local| parent_world * local);

                // deeper visits use deeper slots, so this one stays intact
                let count = self.arena.get(depth).map_or(0, |slot| slot.children().len());
                for index in 0..count {
                    let Some(child) = self.arena.get(depth).and_then(|slot| slot.children().get(index).copied()) else {
                        break;
                    };
                    self.visit(scene, child, world, depth + 1, test, views, out);
                }
            }
        }
    }
}

fn classify(bounds: &BoundingVolume, views: &CullViews<'_>, world: &Mat4) -> FrustumIntersection {
    match &views.testing.frustum {
        Some(frustum) => bounds.check_intersection_frustum(frustum, world),
        None => FrustumIntersection::Partial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Frustum;
    use crate::foundation::math::Mat4Ext;
    use crate::render::headless::BoxRenderable;
    use crate::scene::{BillboardMode, LodMode, Shape};

    fn view_from(eye: Vec3, target: Vec3) -> ViewParams {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at(eye, target, Vec3::y());
        ViewParams {
            position: eye,
            field_of_view: std::f32::consts::FRAC_PI_2,
            viewport_width: 800,
            frustum: Some(Frustum::from_matrix(&(projection * view))),
        }
    }

    fn shape_at(scene: &mut SceneGraph, parent: NodeId, name: &str, at: Vec3) -> NodeId {
        let mover = scene.create_transform_group(Mat4::new_translation(&at));
        let shape = scene.create_shape(Shape::new(Arc::new(BoxRenderable::cube(name, 0.5))));
        scene.add_child(mover, shape).unwrap();
        scene.add_child(parent, mover).unwrap();
        shape
    }

    fn cull(scene: &SceneGraph, view: &ViewParams) -> Vec<NodeId> {
        let mut out = CullOutput::default();
        FrustumCuller::default().cull(scene, view, &mut out);
        out.nodes().collect()
    }

    #[test]
    fn test_outside_subtrees_are_pruned() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let ahead = shape_at(&mut scene, root, "ahead", Vec3::new(0.0, 0.0, -10.0));
        let behind = shape_at(&mut scene, root, "behind", Vec3::new(0.0, 0.0, 10.0));
        scene.refresh_bounds();

        let visible = cull(&scene, &view_from(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0)));
        assert_eq!(visible, vec![ahead]);
        assert!(!visible.contains(&behind));
    }

    #[test]
    fn test_fully_inside_subtree_is_emitted_whole_in_traversal_order() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let cluster = scene.create_group();
        scene.add_child(root, cluster).unwrap();
        let shapes: Vec<NodeId> = (0..4)
            .map(|i| shape_at(&mut scene, cluster, "box", Vec3::new(i as f32 - 1.5, 0.0, -20.0)))
            .collect();
        scene.refresh_bounds();

        assert_eq!(cull(&scene, &view_from(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0))), shapes);
    }

    #[test]
    fn test_void_bounds_are_never_traversed() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let empty = scene.create_group();
        scene.add_child(root, empty).unwrap();
        scene.refresh_bounds();

        let mut out = CullOutput::default();
        let mut culler = FrustumCuller::new(&CullingConfig { enable_frustum_culling: false, ..CullingConfig::default() });
        culler.cull(&scene, &view_from(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0)), &mut out);
        assert!(out.is_empty());
        // the root itself is void and prunes everything
        assert_eq!(out.visited, 1);
    }

    #[test]
    fn test_links_instance_shared_geometry() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let shared = scene.create_shared_group();
        let shape = scene.create_shape(Shape::new(Arc::new(BoxRenderable::cube("instanced", 0.5))));
        scene.add_child(shared, shape).unwrap();
        for x in [-2.0, 2.0] {
            let mover = scene.create_transform_group(Mat4::new_translation(&Vec3::new(x, 0.0, -10.0)));
            let link = scene.create_link(shared).unwrap();
            scene.add_child(mover, link).unwrap();
            scene.add_child(root, mover).unwrap();
        }
        scene.refresh_bounds();

        let mut out = CullOutput::default();
        FrustumCuller::default().cull(&scene, &view_from(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0)), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out.entries[0].world_center.x, -2.0);
        assert_eq!(out.entries[1].world_center.x, 2.0);
    }

    #[test]
    fn test_lod_emits_only_the_selected_child() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let lod = scene.create_lod(LodMode::Distance);
        scene.add_child(root, lod).unwrap();
        let high = shape_at(&mut scene, lod, "high", Vec3::new(0.0, 0.0, -10.0));
        let low = shape_at(&mut scene, lod, "low", Vec3::new(0.0, 0.0, -10.0));
        scene.set_lod_range(lod, 0, 15.0).unwrap();
        scene.refresh_bounds();

        let near = view_from(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(cull(&scene, &near), vec![high]);
        let far = view_from(Vec3::new(0.0, 0.0, 20.0), Vec3::new(0.0, 0.0, -10.0));
        assert_eq!(cull(&scene, &far), vec![low]);
    }

    #[test]
    fn test_billboard_children_face_the_viewer() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let billboard = scene.create_billboard(BillboardMode::Point, Vec3::y());
        scene.add_child(root, billboard).unwrap();
        let sprite = scene.create_shape(Shape::new(Arc::new(BoxRenderable::cube("sprite", 0.5))));
        scene.add_child(billboard, sprite).unwrap();
        scene.refresh_bounds();

        let mut out = CullOutput::default();
        let view = view_from(Vec3::new(5.0, 0.0, 0.0), Vec3::zeros());
        FrustumCuller::default().cull(&scene, &view, &mut out);
        assert_eq!(out.len(), 1);
        let facing = out.entries[0].world_transform.transform_vector(&Vec3::z());
        approx::assert_relative_eq!(facing, Vec3::x(), epsilon = 1e-5);
    }

    #[test]
    fn test_marker_survives_when_its_ancestors_are_out_of_view() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let behind = scene.create_transform_group(Mat4::new_translation(&Vec3::new(0.0, 0.0, 30.0)));
        scene.add_child(root, behind).unwrap();
        let hidden = shape_at(&mut scene, behind, "hidden", Vec3::zeros());
        let ahead = shape_at(&mut scene, root, "ahead", Vec3::new(0.0, 0.0, -10.0));
        let marker = scene.create_marker();
        let arrow = scene.create_shape(Shape::new(Arc::new(BoxRenderable::cube("arrow", 0.1))));
        scene.add_child(marker, arrow).unwrap();
        scene.add_child(behind, marker).unwrap();
        scene.set_marker_target(marker, Some(ahead)).unwrap();
        scene.refresh_bounds();

        let visible = cull(&scene, &view_from(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0)));
        assert_eq!(visible, vec![arrow, ahead]);
        assert!(!visible.contains(&hidden));
    }

    #[test]
    fn test_instruction_slots_start_each_pass_empty() {
        let mut scene = SceneGraph::new();
        scene.refresh_bounds();
        let mut culler = FrustumCuller::default();
        culler.arena.slot(0).add_child(scene.root());

        let mut out = CullOutput::default();
        culler.cull(&scene, &view_from(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0)), &mut out);
        assert!(culler.arena.get(0).map_or(true, |slot| slot.children().is_empty()));
    }
}
