//! The scene graph arena
//!
//! Owns every node, enforces the parent/child structure and the
//! update-window rules, and maintains the per-node bounds cache.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};
use slotmap::SlotMap;

use crate::bounds::BoundingVolume;
use crate::foundation::math::{Mat4, Vec3};
use crate::pick::{PickError, PickMask};
use crate::scene::node::BoundsCache;
use crate::scene::{
    Billboard, BillboardMode, LodGroup, LodMode, MarkerGroup, Node, NodeId, NodeKind, SceneError, SceneResult,
    Shape, UpdateHandler,
};

/// Radius of the bounds reported by marker groups
///
/// Markers are placed relative to the viewer, so their extent is unknown
/// until traversal; they report a sphere large enough that they are never
/// culled. Ancestors leave it out of their own bounds. Finite so that
/// transforms of it stay finite.
pub const UNBOUNDED_RADIUS: f32 = 1.0e18;

/// How a node derives its bounds from its children
enum BoundsRule {
    Children,
    Transformed(Mat4),
    Billboard,
    Unbounded,
    Link(Option<NodeId>),
    Leaf(BoundingVolume),
}

/// Arena of scene nodes with a single root group
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    handler: Option<Arc<dyn UpdateHandler>>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("live", &self.is_live())
            .finish()
    }
}

impl SceneGraph {
    /// Create a detached scene containing only an empty root group
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(NodeKind::group()));
        Self { nodes, root, handler: None }
    }

    /// Root group
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> SceneResult<&Node> {
        self.nodes.get(id).ok_or(SceneError::UnknownNode(id))
    }

    /// Look up a node, `None` when absent
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Whether `id` is in the arena
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, the root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root exists for the scene's lifetime
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the scene is attached to a pipeline
    pub fn is_live(&self) -> bool {
        self.handler.is_some()
    }

    /// Handler gating writes, present while the scene is live
    pub fn update_handler(&self) -> Option<&Arc<dyn UpdateHandler>> {
        self.handler.as_ref()
    }

    /// Attach the scene to a pipeline; the root subtree becomes live
    pub fn attach(&mut self, handler: Arc<dyn UpdateHandler>) {
        self.handler = Some(handler);
        self.set_subtree_live(self.root, true);
        info!("Scene attached with {} nodes", self.nodes.len());
    }

    /// Detach the scene from its pipeline; every node stops being live
    pub fn detach(&mut self) {
        self.handler = None;
        self.set_subtree_live(self.root, false);
        info!("Scene detached");
    }

    // ----- creation -----

    /// Create a detached node
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.insert(Node::new(kind));
        debug!("Created {} node {:?}", self.nodes[id].kind.type_name(), id);
        id
    }

    /// Create an empty group
    pub fn create_group(&mut self) -> NodeId {
        self.create(NodeKind::group())
    }

    /// Create an empty transform group
    pub fn create_transform_group(&mut self, transform: Mat4) -> NodeId {
        self.create(NodeKind::transform_group(transform))
    }

    /// Create a shape leaf
    pub fn create_shape(&mut self, shape: Shape) -> NodeId {
        self.create(NodeKind::shape(shape))
    }

    /// Create an empty billboard
    pub fn create_billboard(&mut self, mode: BillboardMode, axis: Vec3) -> NodeId {
        self.create(NodeKind::Billboard(Billboard::new(mode, axis)))
    }

    /// Create an empty LOD group
    pub fn create_lod(&mut self, mode: LodMode) -> NodeId {
        self.create(NodeKind::LodGroup(LodGroup::new(mode)))
    }

    /// Create an enabled marker group without a target
    pub fn create_marker(&mut self) -> NodeId {
        self.create(NodeKind::MarkerGroup(MarkerGroup::new()))
    }

    /// Create an empty shared group
    pub fn create_shared_group(&mut self) -> NodeId {
        self.create(NodeKind::shared_group())
    }

    /// Create a link instancing `shared`
    pub fn create_link(&mut self, shared: NodeId) -> SceneResult<NodeId> {
        self.shared_group_check(shared)?;
        let link = self.create(NodeKind::link());
        self.set_link_target(link, Some(shared))?;
        Ok(link)
    }

    /// Set a node's debug name
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> SceneResult<()> {
        self.check_data_write(id)?;
        self.node_mut(id)?.name = Some(name.into());
        Ok(())
    }

    // ----- structure -----

    /// Append `child` to `parent`'s child list
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        let len = self.node(parent)?.children().len();
        self.insert_child(parent, len, child)
    }

    /// Insert `child` at `index` in `parent`'s child list
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> SceneResult<()> {
        self.check_data_write(parent)?;
        let child_node = self.node(child)?;
        if child_node.parent.is_some() || child == self.root {
            return Err(SceneError::AlreadyParented(child));
        }
        if matches!(child_node.kind, NodeKind::SharedGroup(_)) {
            return Err(SceneError::InvalidArgument("shared groups are instanced through links".into()));
        }
        let len = self
            .node(parent)?
            .kind
            .group_data()
            .map(|group| group.children.len())
            .ok_or(SceneError::NotAGroup(parent))?;
        if index > len {
            return Err(SceneError::ChildIndexOutOfRange { index, len });
        }
        if self.would_cycle(parent, child) {
            return Err(SceneError::CycleDetected);
        }

        let parent_node = self.node_mut(parent)?;
        let live = parent_node.live;
        if let Some(group) = parent_node.kind.group_data_mut() {
            group.children.insert(index, child);
        }
        if let NodeKind::LodGroup(lod) = &mut parent_node.kind {
            let count = lod.group.children.len();
            lod.child_inserted(index, count);
        }
        self.node_mut(child)?.parent = Some(parent);
        if live {
            self.set_subtree_live(child, true);
        }
        self.invalidate_bounds(parent);
        Ok(())
    }

    /// Remove and return the child at `index`; later children shift down
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> SceneResult<NodeId> {
        self.check_data_write(parent)?;
        let parent_node = self.node_mut(parent)?;
        let group = parent_node.kind.group_data_mut().ok_or(SceneError::NotAGroup(parent))?;
        let len = group.children.len();
        if index >= len {
            return Err(SceneError::ChildIndexOutOfRange { index, len });
        }
        let child = group.children.remove(index);
        if let NodeKind::LodGroup(lod) = &mut parent_node.kind {
            let count = lod.group.children.len();
            lod.child_removed(index, count);
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
        self.set_subtree_live(child, false);
        self.invalidate_bounds(parent);
        Ok(child)
    }

    /// Remove `id` from its parent, if it has one
    pub fn detach_node(&mut self, id: NodeId) -> SceneResult<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        let index = self
            .node(parent)?
            .children()
            .iter()
            .position(|child| *child == id)
            .ok_or(SceneError::UnknownNode(id))?;
        self.remove_child(parent, index).map(|_| ())
    }

    /// Remove `id` and everything it owns from the arena
    ///
    /// Shared groups reached through links are not owned and survive; the
    /// destroyed links are unregistered from them. A shared group can only
    /// be destroyed once no link references it.
    pub fn destroy(&mut self, id: NodeId) -> SceneResult<()> {
        if id == self.root {
            return Err(SceneError::InvalidArgument("the root cannot be destroyed".into()));
        }
        if let NodeKind::SharedGroup(shared) = &self.node(id)?.kind {
            if shared.reference_count() > 0 {
                return Err(SceneError::InvalidArgument(format!(
                    "shared group still referenced by {} links",
                    shared.reference_count()
                )));
            }
        }
        self.detach_node(id)?;

        let mut pending = vec![id];
        let mut removed = 0usize;
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.remove(current) else {
                continue;
            };
            removed += 1;
            if let NodeKind::Link(link) = &node.kind {
                if let Some(target) = link.target {
                    self.unregister_link(target, current);
                }
            }
            pending.extend_from_slice(node.children());
        }
        debug!("Destroyed {} nodes under {:?}", removed, id);
        Ok(())
    }

    /// Point `link` at `target`, or unbind it with `None`
    pub fn set_link_target(&mut self, link: NodeId, target: Option<NodeId>) -> SceneResult<()> {
        self.check_data_write(link)?;
        let NodeKind::Link(current) = &self.node(link)?.kind else {
            return Err(SceneError::InvalidArgument(format!("{link:?} is not a link")));
        };
        let previous = current.target;
        if let Some(target) = target {
            self.shared_group_check(target)?;
            if self.would_cycle(link, target) {
                return Err(SceneError::CycleDetected);
            }
        }

        if let Some(previous) = previous {
            self.unregister_link(previous, link);
        }
        if let NodeKind::Link(current) = &mut self.node_mut(link)?.kind {
            current.target = target;
        }
        if let Some(target) = target {
            if let Some(NodeKind::SharedGroup(shared)) = self.nodes.get_mut(target).map(|n| &mut n.kind) {
                shared.parents.push(link);
            }
            self.refresh_shared_liveness(target);
        }
        self.invalidate_bounds(link);
        Ok(())
    }

    // ----- node data -----

    /// Replace a transform group's matrix
    pub fn set_transform(&mut self, id: NodeId, transform: Mat4) -> SceneResult<()> {
        self.check_data_write(id)?;
        match &mut self.node_mut(id)?.kind {
            NodeKind::TransformGroup(tg) => tg.transform = transform,
            other => {
                return Err(SceneError::InvalidArgument(format!("{} has no transform", other.type_name())));
            }
        }
        self.invalidate_bounds(id);
        Ok(())
    }

    /// Set explicit bounds, or `None` to derive them from children again
    pub fn set_bounds(&mut self, id: NodeId, bounds: Option<BoundingVolume>) -> SceneResult<()> {
        self.check_bounds_write(id)?;
        self.node_mut(id)?.bounds.explicit = bounds;
        self.force_invalidate(id);
        Ok(())
    }

    /// Invalidate a node's cached bounds, e.g. after a renderable's geometry changed
    pub fn mark_bounds_dirty(&mut self, id: NodeId) -> SceneResult<()> {
        self.check_bounds_write(id)?;
        self.force_invalidate(id);
        Ok(())
    }

    /// Set the pick categories a node answers to
    pub fn set_pick_mask(&mut self, id: NodeId, mask: PickMask) -> SceneResult<()> {
        self.check_data_write(id)?;
        self.node_mut(id)?.pick_mask = mask;
        Ok(())
    }

    /// Set a shape's render-order hint
    pub fn set_render_order(&mut self, id: NodeId, order: i32) -> SceneResult<()> {
        self.check_data_write(id)?;
        self.shape_mut(id)?.render_order = order;
        Ok(())
    }

    /// Move a shape into or out of the transparent pass
    pub fn set_transparent(&mut self, id: NodeId, transparent: bool) -> SceneResult<()> {
        self.check_data_write(id)?;
        self.shape_mut(id)?.transparent = transparent;
        Ok(())
    }

    /// Set LOD threshold `index`; see [`LodGroup::set_range`]
    pub fn set_lod_range(&mut self, id: NodeId, index: usize, value: f32) -> SceneResult<()> {
        self.check_data_write(id)?;
        self.lod_mut(id)?.set_range(index, value)
    }

    /// Switch a LOD group between distance and screen-size selection
    pub fn set_lod_mode(&mut self, id: NodeId, mode: LodMode) -> SceneResult<()> {
        self.check_data_write(id)?;
        self.lod_mut(id)?.set_mode(mode);
        Ok(())
    }

    /// Set or clear a LOD group's explicit selection center
    pub fn set_lod_center(&mut self, id: NodeId, center: Option<Vec3>) -> SceneResult<()> {
        self.check_data_write(id)?;
        self.lod_mut(id)?.set_center(center);
        Ok(())
    }

    /// Change a billboard's rotation mode and axis
    pub fn set_billboard_mode(&mut self, id: NodeId, mode: BillboardMode, axis: Vec3) -> SceneResult<()> {
        self.check_data_write(id)?;
        match &mut self.node_mut(id)?.kind {
            NodeKind::Billboard(billboard) => billboard.set_mode(mode, axis),
            other => return Err(SceneError::InvalidArgument(format!("{} is not a billboard", other.type_name()))),
        }
        Ok(())
    }

    /// Set or clear the node a marker group tracks
    pub fn set_marker_target(&mut self, id: NodeId, target: Option<NodeId>) -> SceneResult<()> {
        self.check_data_write(id)?;
        if let Some(target) = target {
            self.node(target)?;
        }
        self.marker_mut(id)?.set_target(target);
        Ok(())
    }

    /// Show or hide a marker group
    pub fn set_marker_enabled(&mut self, id: NodeId, enabled: bool) -> SceneResult<()> {
        self.check_data_write(id)?;
        self.marker_mut(id)?.set_enabled(enabled);
        Ok(())
    }

    // ----- bounds -----

    /// Local bounds of `id`, recomputing the subtree if invalidated
    pub fn bounds(&mut self, id: NodeId) -> SceneResult<BoundingVolume> {
        self.node(id)?;
        Ok(self.resolve_bounds(id))
    }

    /// Bounds as last computed, without recomputation
    pub fn cached_bounds(&self, id: NodeId) -> Option<&BoundingVolume> {
        self.nodes.get(id).map(|node| &node.bounds.cached)
    }

    /// Bounds of `id` in world space
    pub fn world_bounds(&mut self, id: NodeId) -> SceneResult<BoundingVolume> {
        let local = self.bounds(id)?;
        Ok(local.transformed(&self.parent_to_world(id)?))
    }

    /// Recompute every invalidated bounds reachable from the root
    ///
    /// Called when an update is published, before any traversal reads the
    /// cache.
    pub fn refresh_bounds(&mut self) {
        self.resolve_bounds(self.root);
    }

    /// Whether any bounds under the root wait for recomputation
    pub fn bounds_dirty(&self) -> bool {
        self.nodes.get(self.root).map_or(false, |root| root.bounds.dirty)
    }

    // ----- queries -----

    /// Transform from the frame `id` is placed in to world space
    ///
    /// Accumulates transform group matrices up to the top of the graph. A
    /// shared group is left through its first registered link.
    /// Billboards and markers compute their transforms per viewer and
    /// contribute nothing here.
    pub fn parent_to_world(&self, id: NodeId) -> SceneResult<Mat4> {
        let mut transform = Mat4::identity();
        let mut current = self.up(self.node(id)?);
        while let Some(ancestor) = current {
            let node = self.node(ancestor)?;
            if let Some(local) = node.kind.local_transform() {
                transform = local * transform;
            }
            current = self.up(node);
        }
        Ok(transform)
    }

    /// Check that a pick with `mask` may run now
    pub fn check_picking(&self, mask: PickMask) -> Result<(), PickError> {
        if let Some(handler) = &self.handler {
            if !handler.is_picking_permitted() {
                return Err(PickError::InvalidPickTiming);
            }
        }
        if mask.is_empty() {
            return Err(PickError::NotPickable);
        }
        Ok(())
    }

    // ----- internals -----

    fn node_mut(&mut self, id: NodeId) -> SceneResult<&mut Node> {
        self.nodes.get_mut(id).ok_or(SceneError::UnknownNode(id))
    }

    fn shape_mut(&mut self, id: NodeId) -> SceneResult<&mut Shape> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Shape(shape) => Ok(shape),
            other => Err(SceneError::InvalidArgument(format!("{} is not a shape", other.type_name()))),
        }
    }

    fn lod_mut(&mut self, id: NodeId) -> SceneResult<&mut LodGroup> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::LodGroup(lod) => Ok(lod),
            other => Err(SceneError::InvalidArgument(format!("{} is not a LOD group", other.type_name()))),
        }
    }

    fn marker_mut(&mut self, id: NodeId) -> SceneResult<&mut MarkerGroup> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::MarkerGroup(marker) => Ok(marker),
            other => Err(SceneError::InvalidArgument(format!("{} is not a marker group", other.type_name()))),
        }
    }

    fn shared_group_check(&self, id: NodeId) -> SceneResult<()> {
        match &self.node(id)?.kind {
            NodeKind::SharedGroup(_) => Ok(()),
            other => Err(SceneError::InvalidArgument(format!("{} is not a shared group", other.type_name()))),
        }
    }

    fn check_data_write(&self, id: NodeId) -> SceneResult<()> {
        let node = self.node(id)?;
        match &self.handler {
            Some(handler) if node.live && !handler.is_data_write_permitted() => Err(SceneError::InvalidWriteTiming),
            _ => Ok(()),
        }
    }

    fn check_bounds_write(&self, id: NodeId) -> SceneResult<()> {
        let node = self.node(id)?;
        match &self.handler {
            Some(handler) if node.live && !handler.is_bounds_write_permitted() => Err(SceneError::InvalidBoundsTiming),
            _ => Ok(()),
        }
    }

    /// Next node up: the parent, or a shared group's first link
    fn up(&self, node: &Node) -> Option<NodeId> {
        match &node.kind {
            NodeKind::SharedGroup(shared) => shared.parents.first().copied(),
            _ => node.parent,
        }
    }

    /// Every node above `id`, `id` included, following all links of shared groups
    fn ancestors(&self, id: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            match &node.kind {
                NodeKind::SharedGroup(shared) => pending.extend_from_slice(&shared.parents),
                _ => pending.extend(node.parent),
            }
        }
        seen
    }

    /// Whether hanging `lower` below `upper` would close a loop
    fn would_cycle(&self, upper: NodeId, lower: NodeId) -> bool {
        let above = self.ancestors(upper);
        let mut seen = HashSet::new();
        let mut pending = vec![lower];
        while let Some(current) = pending.pop() {
            if above.contains(&current) {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            pending.extend_from_slice(node.children());
            if let NodeKind::Link(link) = &node.kind {
                pending.extend(link.target);
            }
        }
        false
    }

    fn unregister_link(&mut self, shared: NodeId, link: NodeId) {
        if let Some(NodeKind::SharedGroup(group)) = self.nodes.get_mut(shared).map(|n| &mut n.kind) {
            group.parents.retain(|parent| *parent != link);
        }
        self.refresh_shared_liveness(shared);
    }

    /// A shared group is live while any of its links is
    fn refresh_shared_liveness(&mut self, shared: NodeId) {
        let Some(NodeKind::SharedGroup(group)) = self.nodes.get(shared).map(|n| &n.kind) else {
            return;
        };
        let live = group.parents.iter().any(|link| self.nodes.get(*link).map_or(false, |n| n.live));
        if self.nodes.get(shared).map_or(false, |n| n.live != live) {
            self.set_subtree_live(shared, live);
        }
    }

    fn set_subtree_live(&mut self, id: NodeId, live: bool) {
        let mut pending = vec![id];
        let mut shared_groups = Vec::new();
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            node.live = live;
            pending.extend_from_slice(node.children());
            if let NodeKind::Link(link) = &node.kind {
                shared_groups.extend(link.target);
            }
        }
        for shared in shared_groups {
            self.refresh_shared_liveness(shared);
        }
    }

    /// Mark `id` and its ancestors dirty, stopping at the first node that
    /// already is
    fn invalidate_bounds(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            if node.bounds.dirty {
                continue;
            }
            node.bounds.dirty = true;
            match &node.kind {
                NodeKind::SharedGroup(shared) => pending.extend_from_slice(&shared.parents),
                _ => pending.extend(node.parent),
            }
        }
    }

    /// Invalidate `id` even when already dirty, then its ancestors
    fn force_invalidate(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.bounds.dirty = false;
        self.invalidate_bounds(id);
    }

    fn resolve_bounds(&mut self, id: NodeId) -> BoundingVolume {
        let Some(node) = self.nodes.get(id) else {
            return BoundingVolume::Void;
        };
        if !node.bounds.dirty {
            return node.bounds.cached;
        }

        let rule = match &node.kind {
            NodeKind::Group(_) | NodeKind::SharedGroup(_) | NodeKind::LodGroup(_) => BoundsRule::Children,
            NodeKind::TransformGroup(tg) => BoundsRule::Transformed(tg.transform),
            NodeKind::Billboard(_) => BoundsRule::Billboard,
            NodeKind::MarkerGroup(_) => BoundsRule::Unbounded,
            NodeKind::Link(link) => BoundsRule::Link(link.target),
            NodeKind::Shape(shape) => BoundsRule::Leaf(shape.renderable.local_bounds()),
        };
        let children = node.children().to_vec();
        let link_target = match rule {
            BoundsRule::Link(target) => target,
            _ => None,
        };

        let mut merged = BoundingVolume::Void;
        let mut contains_marker = matches!(rule, BoundsRule::Unbounded);
        for child in children {
            let bounds = self.resolve_bounds(child);
            let Some(child_node) = self.nodes.get(child) else {
                continue;
            };
            contains_marker |= child_node.bounds.contains_marker;
            if !matches!(child_node.kind, NodeKind::MarkerGroup(_)) {
                merged = merged.merge(&bounds);
            }
        }

        let derived = match rule {
            BoundsRule::Children => merged,
            BoundsRule::Transformed(matrix) => merged.transformed(&matrix),
            // Any rotation about the origin stays inside this sphere
            BoundsRule::Billboard => match merged.center() {
                Some(center) => BoundingVolume::from_sphere(
                    Vec3::zeros(),
                    center.magnitude() + merged.characteristic_radius(),
                ),
                None => BoundingVolume::Void,
            },
            BoundsRule::Unbounded => BoundingVolume::from_sphere(Vec3::zeros(), UNBOUNDED_RADIUS),
            BoundsRule::Link(target) => target.map_or(BoundingVolume::Void, |t| self.resolve_bounds(t)),
            BoundsRule::Leaf(bounds) => bounds,
        };

        if let Some(target) = link_target {
            contains_marker |= self.nodes.get(target).map_or(false, |n| n.bounds.contains_marker);
        }

        if let Some(node) = self.nodes.get_mut(id) {
            let effective = node.bounds.explicit.unwrap_or(derived);
            node.bounds = BoundsCache {
                explicit: node.bounds.explicit,
                cached: effective,
                contains_marker,
                dirty: false,
            };
            effective
        } else {
            derived
        }
    }
}
