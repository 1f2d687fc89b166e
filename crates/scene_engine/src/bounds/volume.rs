//! The polymorphic bounding volume stored on every scene node

use crate::bounds::{BoundingSphere, Frustum, FrustumIntersection, Ray, AABB};
use crate::foundation::math::{Mat4, Vec3};

/// Bounds of a node
///
/// `Void` means "no geometry yet": it never intersects anything and always
/// classifies as [`FrustumIntersection::AllOut`], so a subtree without
/// valid bounds is never traversed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BoundingVolume {
    /// Axis-aligned box
    Box(AABB),
    /// Sphere
    Sphere(BoundingSphere),
    /// Empty bounds
    #[default]
    Void,
}

impl BoundingVolume {
    /// Box bounds from corners
    pub fn from_box(min: Vec3, max: Vec3) -> Self {
        Self::Box(AABB::new(min, max))
    }

    /// Sphere bounds
    pub fn from_sphere(center: Vec3, radius: f32) -> Self {
        Self::Sphere(BoundingSphere::new(center, radius))
    }

    /// Whether this is the empty volume
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Classify the volume, placed by `world_transform`, against the frustum
    pub fn check_intersection_frustum(&self, frustum: &Frustum, world_transform: &Mat4) -> FrustumIntersection {
        match self {
            Self::Void => FrustumIntersection::AllOut,
            Self::Box(aabb) => {
                let world = aabb.transformed(world_transform);
                frustum.classify_aabb(world.min, world.max)
            }
            Self::Sphere(sphere) => {
                let world = sphere.transformed(world_transform);
                frustum.classify_sphere(world.center, world.radius)
            }
        }
    }

    /// Distance along a world-space ray, with the volume placed by `world_transform`
    pub fn intersect_ray(&self, ray: &Ray, world_transform: &Mat4) -> Option<f32> {
        match self {
            Self::Void => None,
            Self::Box(aabb) => aabb.transformed(world_transform).intersect_ray(ray.origin, ray.direction),
            Self::Sphere(sphere) => sphere.transformed(world_transform).intersect_ray(ray.origin, ray.direction),
        }
    }

    /// Center of the volume; `None` for void bounds
    pub fn center(&self) -> Option<Vec3> {
        match self {
            Self::Void => None,
            Self::Box(aabb) => Some(aabb.center()),
            Self::Sphere(sphere) => Some(sphere.center),
        }
    }

    /// Half-size along each axis; zero for void bounds
    pub fn extents(&self) -> Vec3 {
        match self {
            Self::Void => Vec3::zeros(),
            Self::Box(aabb) => aabb.extents(),
            Self::Sphere(sphere) => Vec3::repeat(sphere.radius),
        }
    }

    /// Radius characterising the volume's size: the sphere radius, or half
    /// the box diagonal
    pub fn characteristic_radius(&self) -> f32 {
        match self {
            Self::Void => 0.0,
            Self::Box(aabb) => aabb.extents().magnitude(),
            Self::Sphere(sphere) => sphere.radius,
        }
    }

    /// Smallest volume of this volume's kind that encloses both
    ///
    /// Mixing a box with a sphere produces a box. Void is the identity.
    pub fn merge(&self, other: &BoundingVolume) -> BoundingVolume {
        match (self, other) {
            (Self::Void, v) | (v, Self::Void) => *v,
            (Self::Box(a), Self::Box(b)) => Self::Box(a.union(b)),
            (Self::Sphere(a), Self::Sphere(b)) => Self::Sphere(a.union(b)),
            (Self::Box(a), Self::Sphere(s)) | (Self::Sphere(s), Self::Box(a)) => Self::Box(a.union(&s.to_aabb())),
        }
    }

    /// Volume after an affine transform, keeping its kind
    pub fn transformed(&self, matrix: &Mat4) -> BoundingVolume {
        match self {
            Self::Void => Self::Void,
            Self::Box(aabb) => Self::Box(aabb.transformed(matrix)),
            Self::Sphere(sphere) => Self::Sphere(sphere.transformed(matrix)),
        }
    }
}
