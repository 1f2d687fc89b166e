//! Spatial bounds
//!
//! Box, sphere and void bounding volumes with frustum classification and
//! ray tests. Every scene node carries a [`BoundingVolume`]; the cull
//! traversal prunes a whole subtree when its bounds classify as
//! [`FrustumIntersection::AllOut`].

mod aabb;
mod frustum;
mod ray;
mod sphere;
mod volume;

pub use aabb::AABB;
pub use frustum::{Frustum, FrustumIntersection, Plane};
pub use ray::Ray;
pub use sphere::BoundingSphere;
pub use volume::BoundingVolume;
