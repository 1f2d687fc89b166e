//! Pick traversal

use log::debug;

use crate::bounds::BoundingVolume;
use crate::foundation::math::{Mat4, Vec3};
use crate::pick::{PickError, PickHit, PickRequest, PickShape};
use crate::scene::{Capability, NodeId, NodeKind, SceneGraph};
use crate::traversal::{InstructionArena, TraversalContext, ViewParams};

/// Field of view assumed for screen-size LOD selection during picks
pub const DEFAULT_PICK_FIELD_OF_VIEW: f32 = std::f32::consts::FRAC_PI_4;

/// Viewport width assumed for screen-size LOD selection during picks
pub const DEFAULT_PICK_VIEWPORT_WIDTH: u32 = 800;

/// Runs pick requests against a scene
///
/// Owns the instruction arena reused across picks. The view settings only
/// matter for LOD groups in screen-size mode, which should pick the same
/// child they render.
#[derive(Debug)]
pub struct Picker {
    arena: InstructionArena,
    field_of_view: f32,
    viewport_width: u32,
}

impl Default for Picker {
    fn default() -> Self {
        Self::new()
    }
}

impl Picker {
    /// Create a picker with default view settings
    pub fn new() -> Self {
        Self {
            arena: InstructionArena::with_depth(16),
            field_of_view: DEFAULT_PICK_FIELD_OF_VIEW,
            viewport_width: DEFAULT_PICK_VIEWPORT_WIDTH,
        }
    }

    /// Match the view of the pipeline whose output is being picked
    pub fn with_view(mut self, field_of_view: f32, viewport_width: u32) -> Self {
        self.field_of_view = field_of_view;
        self.viewport_width = viewport_width;
        self
    }

    /// Every shape hit by `request`, nearest first
    pub fn pick_all(&mut self, scene: &SceneGraph, request: &PickRequest) -> Result<Vec<PickHit>, PickError> {
        scene.check_picking(request.mask)?;

        let view = ViewParams {
            position: request.origin(),
            field_of_view: self.field_of_view,
            viewport_width: self.viewport_width,
            frustum: None,
        };
        let mut hits = Vec::new();
        self.arena.reset();
        self.visit(scene, scene.root(), Mat4::identity(), 0, request, &view, &mut hits)?;
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!("Pick found {} hits", hits.len());
        Ok(hits)
    }

    /// Nearest shape hit by `request`
    pub fn pick_closest(&mut self, scene: &SceneGraph, request: &PickRequest) -> Result<Option<PickHit>, PickError> {
        Ok(self.pick_all(scene, request)?.into_iter().next())
    }

    /// Run several requests in one picking window; results are in request order
    pub fn pick_batch(&mut self, scene: &SceneGraph, requests: &[PickRequest]) -> Result<Vec<Vec<PickHit>>, PickError> {
        requests.iter().map(|request| self.pick_all(scene, request)).collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn visit(
        &mut self,
        scene: &SceneGraph,
        id: NodeId,
        parent_world: Mat4,
        depth: usize,
        request: &PickRequest,
        view: &ViewParams,
        hits: &mut Vec<PickHit>,
    ) -> Result<(), PickError> {
        let node = scene.get(id).ok_or(PickError::UnknownNode(id))?;
        if !node.pick_mask().intersects(request.mask) {
            return Ok(());
        }

        match node.capability() {
            Capability::Leaf => {
                if let Some(distance) = hit_distance(&node.bounds.cached, &parent_world, &request.shape) {
                    hits.push(PickHit { node: id, distance, world_transform: parent_world });
                }
            }
            Capability::Link => {
                if let NodeKind::Link(link) = node.kind() {
                    if let Some(target) = link.target() {
                        self.visit(scene, target, parent_world, depth + 1, request, view, hits)?;
                    }
                }
            }
            Capability::Standard => {
                if !node.contains_marker() && hit_distance(&node.bounds.cached, &parent_world, &request.shape).is_none() {
                    return Ok(());
                }
                let world = node.kind().local_transform().map_or(parent_world, |local| parent_world * local);
                for child in node.children() {
                    self.visit(scene, *child, world, depth + 1, request, view, hits)?;
                }
            }
            Capability::Custom => {
                if !node.contains_marker() && hit_distance(&node.bounds.cached, &parent_world, &request.shape).is_none() {
                    return Ok(());
                }
                let Some(target) = node.kind().as_custom_pick_target() else {
                    return Ok(());
                };
                let ctx = TraversalContext { scene, node: id, world_transform: parent_world, view };
                let slot = self.arena.slot(depth);
                target.pick_children(node, &ctx, request, slot)?;
                let world = slot.transform().map_or(parent_world, |local| parent_world * local);

                // deeper visits use deeper slots, so this one stays intact
                let count = self.arena.get(depth).map_or(0, |slot| slot.children().len());
                for index in 0..count {
                    let Some(child) = self.arena.get(depth).and_then(|slot| slot.children().get(index).copied()) else {
                        break;
                    };
                    self.visit(scene, child, world, depth + 1, request, view, hits)?;
                }
            }
        }
        Ok(())
    }
}

/// Distance at which `shape` meets `bounds` placed by `world`
fn hit_distance(bounds: &BoundingVolume, world: &Mat4, shape: &PickShape) -> Option<f32> {
    match shape {
        PickShape::Ray(ray) => bounds.intersect_ray(ray, world),
        PickShape::Point { position, tolerance } => {
            let placed = bounds.transformed(world);
            let center = placed.center()?;
            let inside = match placed {
                BoundingVolume::Box(aabb) => {
                    let closest = Vec3::new(
                        position.x.clamp(aabb.min.x, aabb.max.x),
                        position.y.clamp(aabb.min.y, aabb.max.y),
                        position.z.clamp(aabb.min.z, aabb.max.z),
                    );
                    (closest - position).magnitude() <= *tolerance
                }
                BoundingVolume::Sphere(sphere) => (sphere.center - position).magnitude() <= sphere.radius + tolerance,
                BoundingVolume::Void => false,
            };
            inside.then(|| (center - position).magnitude())
        }
    }
}
