//! Billboards: groups that turn to face the viewer every frame

use crate::bounds::FrustumIntersection;
use crate::foundation::math::{Mat3, Mat4, Vec3};
use crate::pick::{PickError, PickRequest};
use crate::scene::node::Group;
use crate::scene::Node;
use crate::traversal::{
    CullInstructions, CustomCullable, CustomPickTarget, PickInstructions, TraversalContext,
};

/// Below this `cos²` the viewer is treated as lying on the up axis
pub const ALIGNMENT_EPSILON: f32 = 1e-5;

/// How a billboard rotates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillboardMode {
    /// Rotate about a point so local +Z faces the viewer, keeping local +Y
    /// as close to the up vector as possible
    #[default]
    Point,
    /// Rotate about the axis only (cylindrical billboard)
    Axis,
}

/// Rotation facing a viewer, with the sine/cosine used to build it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacingRotation {
    /// Rotation matrix
    pub matrix: Mat4,
    /// Sine of the viewer's elevation toward the up vector
    pub sin_y: f32,
    /// Cosine of that elevation
    pub cos_y: f32,
}

/// Rotation taking local +Z to `to_viewer` with local +Y leaning toward `up`
///
/// When the viewer lies (nearly) on the up axis, `cos_y²` drops below
/// [`ALIGNMENT_EPSILON`]; the rotation is then built as fully aligned
/// (`cos_y = 0`, `sin_y = 1`) with a fixed side axis instead of dividing by
/// a vanishing cosine.
pub fn facing_rotation(to_viewer: Vec3, up: Vec3) -> FacingRotation {
    let (Some(forward), Some(up)) = (to_viewer.try_normalize(f32::EPSILON), up.try_normalize(f32::EPSILON)) else {
        return FacingRotation { matrix: Mat4::identity(), sin_y: 0.0, cos_y: 1.0 };
    };

    let mut sin_y = forward.dot(&up);
    let cos_sq = 1.0 - sin_y * sin_y;
    let cos_y;
    let side;
    if cos_sq < ALIGNMENT_EPSILON {
        cos_y = 0.0;
        sin_y = 1.0;
        side = perpendicular(forward);
    } else {
        cos_y = cos_sq.sqrt();
        side = up.cross(&forward) / cos_y;
    }
    let new_up = forward.cross(&side);

    let basis = Mat3::from_columns(&[side, new_up, forward]);
    FacingRotation {
        matrix: basis.to_homogeneous(),
        sin_y,
        cos_y,
    }
}

/// Rotation about `axis` turning local +Z toward `to_viewer`
///
/// Identity when the viewer sits on the axis.
pub fn axis_rotation(to_viewer: Vec3, axis: Vec3) -> Mat4 {
    let Some(axis) = axis.try_normalize(f32::EPSILON) else {
        return Mat4::identity();
    };
    let Some(target) = (to_viewer - axis * axis.dot(&to_viewer)).try_normalize(1e-6) else {
        return Mat4::identity();
    };
    let reference = [Vec3::z(), Vec3::x()]
        .into_iter()
        .find_map(|v| (v - axis * axis.dot(&v)).try_normalize(1e-6))
        .unwrap_or_else(|| perpendicular(axis));

    let cos = reference.dot(&target);
    let sin = axis.dot(&reference.cross(&target));

    // Rodrigues: R = cos I + sin [a]x + (1 - cos) a aᵀ
    let cross = axis.cross_matrix();
    let rotation = Mat3::identity() * cos + cross * sin + axis * axis.transpose() * (1.0 - cos);
    rotation.to_homogeneous()
}

/// Unit vector perpendicular to `v`
fn perpendicular(v: Vec3) -> Vec3 {
    let helper = if v.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    v.cross(&helper).normalize()
}

/// Group rotated every frame to face the viewer
#[derive(Debug, Clone)]
pub struct Billboard {
    pub(crate) group: Group,
    mode: BillboardMode,
    axis: Vec3,
}

impl Default for Billboard {
    fn default() -> Self {
        Self::new(BillboardMode::Point, Vec3::y())
    }
}

impl Billboard {
    /// Create a billboard; `axis` is the rotation axis in axis mode and the
    /// up vector in point mode
    pub fn new(mode: BillboardMode, axis: Vec3) -> Self {
        Self {
            group: Group::default(),
            mode,
            axis,
        }
    }

    /// Rotation mode
    pub fn mode(&self) -> BillboardMode {
        self.mode
    }

    /// Rotation axis / up vector
    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    pub(crate) fn set_mode(&mut self, mode: BillboardMode, axis: Vec3) {
        self.mode = mode;
        self.axis = axis;
    }

    /// Local rotation for a viewer at `viewpoint` in the billboard's parent frame
    pub fn rotation_for(&self, viewpoint: Vec3) -> Mat4 {
        match self.mode {
            BillboardMode::Point => facing_rotation(viewpoint, self.axis).matrix,
            BillboardMode::Axis => axis_rotation(viewpoint, self.axis),
        }
    }
}

impl CustomCullable for Billboard {
    fn cull_children(&self, node: &Node, ctx: &TraversalContext<'_>, out: &mut CullInstructions) -> FrustumIntersection {
        let intersection = ctx.test_bounds(node);
        if intersection == FrustumIntersection::AllOut {
            return intersection;
        }
        out.set_transform(self.rotation_for(ctx.local_viewpoint()));
        out.add_children(self.group.children());
        intersection
    }
}

impl CustomPickTarget for Billboard {
    fn pick_children(
        &self,
        _node: &Node,
        ctx: &TraversalContext<'_>,
        request: &PickRequest,
        out: &mut PickInstructions,
    ) -> Result<(), PickError> {
        ctx.scene.check_picking(request.mask)?;
        out.set_transform(self.rotation_for(ctx.local_viewpoint()));
        out.add_children(self.group.children());
        Ok(())
    }
}
