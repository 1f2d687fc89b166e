//! Level-of-detail groups
//!
//! A LOD group shows exactly one of its children, chosen each frame from
//! the viewer's distance or the children's projected size. Thresholds are
//! kept strictly increasing; there is one fewer threshold than children,
//! the last child being the fallback beyond every threshold.

use crate::bounds::FrustumIntersection;
use crate::foundation::math::{utils, Point3, Vec3};
use crate::pick::{PickError, PickRequest};
use crate::scene::node::Group;
use crate::scene::{Node, SceneError, SceneResult};
use crate::traversal::{
    CullInstructions, CustomCullable, CustomPickTarget, PickInstructions, TraversalContext,
};

/// How thresholds are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LodMode {
    /// Threshold is a viewer distance; first child whose threshold is at
    /// least the distance wins, otherwise the last child
    #[default]
    Distance,
    /// Threshold is a projected size in pixels; first child whose projected
    /// size is at most its threshold wins, otherwise nothing is shown
    ScreenSize,
}

/// Group that shows one child selected by viewer distance or screen size
#[derive(Debug, Clone, Default)]
pub struct LodGroup {
    pub(crate) group: Group,
    mode: LodMode,
    ranges: Vec<Option<f32>>,
    center: Option<Vec3>,
}

impl LodGroup {
    /// Create an empty LOD group
    pub fn new(mode: LodMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Threshold interpretation
    pub fn mode(&self) -> LodMode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: LodMode) {
        self.mode = mode;
    }

    /// Thresholds, one per child except the last; `None` marks a slot that
    /// has not been configured and is skipped during selection
    pub fn ranges(&self) -> &[Option<f32>] {
        &self.ranges
    }

    /// Configured threshold at `index`
    pub fn range(&self, index: usize) -> Option<f32> {
        self.ranges.get(index).copied().flatten()
    }

    /// Explicit selection center; the bounds center is used when unset
    pub fn center(&self) -> Option<Vec3> {
        self.center
    }

    pub(crate) fn set_center(&mut self, center: Option<Vec3>) {
        self.center = center;
    }

    /// Set threshold `index`
    ///
    /// Fails with [`SceneError::InvalidLodRange`] when the value is not
    /// strictly between the nearest configured neighbours; the thresholds
    /// are unchanged then.
    pub fn set_range(&mut self, index: usize, value: f32) -> SceneResult<()> {
        if index >= self.ranges.len() {
            return Err(SceneError::ChildIndexOutOfRange { index, len: self.ranges.len() });
        }
        let previous = self.ranges[..index].iter().rev().find_map(|range| *range);
        let next = self.ranges[index + 1..].iter().find_map(|range| *range);
        let above_previous = previous.map_or(true, |previous| previous < value);
        let below_next = next.map_or(true, |next| value < next);
        if value.is_nan() || !above_previous || !below_next {
            return Err(SceneError::InvalidLodRange { index, value });
        }
        self.ranges[index] = Some(value);
        Ok(())
    }

    /// Keep one threshold per child but the last after inserting a child at
    /// `index`
    ///
    /// A child placed before the last gets an unconfigured slot. A child
    /// appended at the end becomes the fallback and the previous fallback
    /// takes `+inf`, so the newcomer is not selected either way.
    pub(crate) fn child_inserted(&mut self, index: usize, child_count: usize) {
        if index + 1 < child_count {
            self.ranges.insert(index.min(self.ranges.len()), None);
        }
        self.ranges.resize(child_count.saturating_sub(1), Some(f32::INFINITY));
    }

    /// Keep one threshold per child but the last after removing child `index`
    pub(crate) fn child_removed(&mut self, index: usize, child_count: usize) {
        if index < self.ranges.len() {
            self.ranges.remove(index);
        }
        self.ranges.resize(child_count.saturating_sub(1), Some(f32::INFINITY));
    }

    /// Distance mode selection from the squared viewer distance
    pub fn select_by_distance(&self, distance_sq: f32) -> Option<usize> {
        let count = self.group.children.len();
        if count == 0 {
            return None;
        }
        let selected = self
            .ranges
            .iter()
            .take(count - 1)
            .position(|range| matches!(range, Some(range) if range * range >= distance_sq));
        Some(selected.unwrap_or(count - 1))
    }

    /// Screen-size mode selection
    ///
    /// `radii[i]` is child `i`'s characteristic radius, `distance` the viewer
    /// distance and `angular_resolution` the radians covered by one pixel.
    pub fn select_by_screen_size(&self, radii: &[f32], distance: f32, angular_resolution: f32) -> Option<usize> {
        if distance <= 0.0 || angular_resolution <= 0.0 {
            return None;
        }
        self.ranges.iter().zip(radii).position(|(range, radius)| {
            matches!(range, Some(range) if radius / distance / angular_resolution <= *range)
        })
    }

    /// Child selected for the viewer in `ctx`
    pub fn select(&self, node: &Node, ctx: &TraversalContext<'_>) -> Option<usize> {
        let center = self
            .center
            .or_else(|| node.bounds.cached.center())
            .unwrap_or_else(Vec3::zeros);
        let world_center = ctx.world_transform.transform_point(&Point3::from(center)).coords;
        let distance_sq = (ctx.view.position - world_center).magnitude_squared();

        match self.mode {
            LodMode::Distance => self.select_by_distance(distance_sq),
            LodMode::ScreenSize => {
                let scale = utils::max_axis_scale(&ctx.world_transform);
                let radii: Vec<f32> = self
                    .group
                    .children
                    .iter()
                    .map(|child| ctx.scene.cached_bounds(*child).map_or(0.0, |b| b.characteristic_radius() * scale))
                    .collect();
                self.select_by_screen_size(&radii, distance_sq.sqrt(), ctx.view.angular_resolution())
            }
        }
    }
}

impl CustomCullable for LodGroup {
    fn cull_children(&self, node: &Node, ctx: &TraversalContext<'_>, out: &mut CullInstructions) -> FrustumIntersection {
        let intersection = ctx.test_bounds(node);
        if intersection == FrustumIntersection::AllOut {
            return intersection;
        }
        if let Some(index) = self.select(node, ctx) {
            out.add_child(self.group.children[index]);
        }
        intersection
    }
}

impl CustomPickTarget for LodGroup {
    fn pick_children(
        &self,
        node: &Node,
        ctx: &TraversalContext<'_>,
        request: &PickRequest,
        out: &mut PickInstructions,
    ) -> Result<(), PickError> {
        ctx.scene.check_picking(request.mask)?;
        if let Some(index) = self.select(node, ctx) {
            out.add_child(self.group.children[index]);
        }
        Ok(())
    }
}
