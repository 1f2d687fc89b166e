//! Rays used by pick requests

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Half-line from an origin along a direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point
    pub origin: Vec3,
    /// Direction, normalized on construction when non-zero
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = direction.try_normalize(f32::EPSILON).unwrap_or(direction);
        Self { origin, direction }
    }

    /// Point at distance `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Ray {
        Ray::new(
            matrix.transform_point(&Point3::from(self.origin)).coords,
            matrix.transform_vector(&self.direction),
        )
    }
}
