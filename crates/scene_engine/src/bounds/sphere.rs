//! Bounding spheres

use crate::bounds::AABB;
use crate::foundation::math::{utils, Mat4, Point3, Vec3};

/// Sphere described by a center and radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Center of the sphere
    pub center: Vec3,
    /// Radius, never negative
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a new sphere; negative radii are clamped to zero
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius: radius.max(0.0) }
    }

    /// Sphere circumscribing a box
    pub fn from_aabb(aabb: &AABB) -> Self {
        Self::new(aabb.center(), aabb.extents().magnitude())
    }

    /// Box enclosing the sphere
    pub fn to_aabb(&self) -> AABB {
        AABB::from_center_extents(self.center, Vec3::repeat(self.radius))
    }

    /// Smallest sphere enclosing both spheres
    pub fn union(&self, other: &BoundingSphere) -> BoundingSphere {
        let offset = other.center - self.center;
        let distance = offset.magnitude();

        if distance + other.radius <= self.radius {
            return *self;
        }
        if distance + self.radius <= other.radius {
            return *other;
        }

        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = self.center + offset * ((radius - self.radius) / distance);
        BoundingSphere::new(center, radius)
    }

    /// Sphere enclosing this sphere after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> BoundingSphere {
        let center = matrix.transform_point(&Point3::from(self.center)).coords;
        BoundingSphere::new(center, self.radius * utils::max_axis_scale(matrix))
    }

    /// Distance along the ray to the first intersection, if any
    pub fn intersect_ray(&self, ray_origin: Vec3, ray_dir: Vec3) -> Option<f32> {
        let dir_len_sq = ray_dir.magnitude_squared();
        if dir_len_sq == 0.0 {
            return None;
        }
        let dir = ray_dir / dir_len_sq.sqrt();
        let to_center = self.center - ray_origin;
        let projection = to_center.dot(&dir);
        let closest_sq = to_center.magnitude_squared() - projection * projection;
        let radius_sq = self.radius * self.radius;
        if closest_sq > radius_sq {
            return None;
        }
        let half_chord = (radius_sq - closest_sq).sqrt();
        let far = projection + half_chord;
        if far < 0.0 {
            return None;
        }
        Some((projection - half_chord).max(0.0))
    }
}
