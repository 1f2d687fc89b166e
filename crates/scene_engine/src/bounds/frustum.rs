//! View frustum planes and the three-way intersection result

use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Outcome of testing a volume against a frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumIntersection {
    /// Entirely inside every plane; children need no further testing
    AllIn,
    /// Entirely outside at least one plane; the subtree is pruned
    AllOut,
    /// Straddles at least one plane
    Partial,
}

impl FrustumIntersection {
    /// Whether anything of the volume may be visible
    pub fn is_visible(self) -> bool {
        self != Self::AllOut
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (should be normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane through `point` facing along `normal`
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self { normal, distance: -normal.dot(&point) }
    }

    /// Build from raw `ax + by + cz + d` coefficients, normalizing them
    fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.magnitude();
        if length == 0.0 {
            return Self { normal: Vec3::zeros(), distance: 0.0 };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling; plane normals point inward
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for clip space with depth in `-w..w`.
    pub fn from_matrix(vp_matrix: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { vp_matrix.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Classify a world-space box
    pub fn classify_aabb(&self, min: Vec3, max: Vec3) -> FrustumIntersection {
        let mut result = FrustumIntersection::AllIn;
        for plane in &self.planes {
            // Corner furthest along the normal (positive vertex) and the
            // one furthest against it (negative vertex).
            let mut positive = min;
            let mut negative = max;
            if plane.normal.x >= 0.0 { positive.x = max.x; negative.x = min.x; }
            if plane.normal.y >= 0.0 { positive.y = max.y; negative.y = min.y; }
            if plane.normal.z >= 0.0 { positive.z = max.z; negative.z = min.z; }

            if plane.distance_to_point(positive) < 0.0 {
                return FrustumIntersection::AllOut;
            }
            if plane.distance_to_point(negative) < 0.0 {
                result = FrustumIntersection::Partial;
            }
        }
        result
    }

    /// Classify a world-space sphere
    pub fn classify_sphere(&self, center: Vec3, radius: f32) -> FrustumIntersection {
        let mut result = FrustumIntersection::AllIn;
        for plane in &self.planes {
            let distance = plane.distance_to_point(center);
            if distance < -radius {
                return FrustumIntersection::AllOut;
            }
            if distance < radius {
                result = FrustumIntersection::Partial;
            }
        }
        result
    }

    /// Test if a point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;

    fn camera_frustum() -> Frustum {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());
        Frustum::from_matrix(&(projection * view))
    }

    #[test]
    fn test_extracted_planes_contain_target() {
        let frustum = camera_frustum();
        assert!(frustum.contains_point(Vec3::zeros()));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 20.0)));
    }

    #[test]
    fn test_classify_aabb() {
        let frustum = camera_frustum();
        let inside = frustum.classify_aabb(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        assert_eq!(inside, FrustumIntersection::AllIn);

        let outside = frustum.classify_aabb(Vec3::new(500.0, 0.0, 0.0), Vec3::new(501.0, 1.0, 1.0));
        assert_eq!(outside, FrustumIntersection::AllOut);

        let straddling = frustum.classify_aabb(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 15.0));
        assert_eq!(straddling, FrustumIntersection::Partial);
    }

    #[test]
    fn test_classify_sphere() {
        let frustum = camera_frustum();
        assert_eq!(frustum.classify_sphere(Vec3::zeros(), 1.0), FrustumIntersection::AllIn);
        assert_eq!(frustum.classify_sphere(Vec3::new(0.0, 0.0, 30.0), 1.0), FrustumIntersection::AllOut);
        assert_eq!(frustum.classify_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0), FrustumIntersection::Partial);
    }
}
