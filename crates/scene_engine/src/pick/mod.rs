//! # Picking
//!
//! Finds the scene nodes under a point or along a ray. The pick traversal
//! follows the same dispatch as culling: standard groups are walked
//! directly, custom nodes (billboards, LOD groups, markers) are asked for
//! their children through [`CustomPickTarget`](crate::traversal::CustomPickTarget)
//! with the request origin standing in for the viewer.
//!
//! Picks are only valid inside the scene's picking window; see
//! [`SceneGraph::check_picking`](crate::scene::SceneGraph::check_picking).

mod picker;

use bitflags::bitflags;
use thiserror::Error;

use crate::bounds::Ray;
use crate::foundation::math::{Mat4, Vec3};
use crate::scene::NodeId;

pub use picker::{Picker, DEFAULT_PICK_FIELD_OF_VIEW, DEFAULT_PICK_VIEWPORT_WIDTH};

bitflags! {
    /// Pick categories
    ///
    /// A node answers a request when its mask shares at least one bit with
    /// the request's mask. Nodes default to every category.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PickMask: u32 {
        /// Visible geometry
        const GEOMETRY = 1 << 0;
        /// Collision proxies
        const COLLIDABLE = 1 << 1;
        /// Interface elements such as markers
        const INTERFACE = 1 << 2;
        /// Reserved for the application
        const USER = 1 << 31;
    }
}

impl Default for PickMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Geometry of a pick request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickShape {
    /// Everything whose bounds come within `tolerance` of a point
    Point {
        /// World-space point
        position: Vec3,
        /// Distance within which bounds count as hit
        tolerance: f32,
    },
    /// Everything whose bounds a ray passes through
    Ray(Ray),
}

/// A single pick query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickRequest {
    /// What to test against
    pub shape: PickShape,
    /// Categories to consider
    pub mask: PickMask,
}

impl PickRequest {
    /// Ray pick from `origin` along `direction`
    pub fn ray(origin: Vec3, direction: Vec3) -> Self {
        Self {
            shape: PickShape::Ray(Ray::new(origin, direction)),
            mask: PickMask::all(),
        }
    }

    /// Point pick at `position`
    pub fn point(position: Vec3, tolerance: f32) -> Self {
        Self {
            shape: PickShape::Point { position, tolerance: tolerance.max(0.0) },
            mask: PickMask::all(),
        }
    }

    /// Restrict the request to `mask`
    pub fn with_mask(mut self, mask: PickMask) -> Self {
        self.mask = mask;
        self
    }

    /// Viewpoint implied by the request, used by viewer-dependent nodes
    pub fn origin(&self) -> Vec3 {
        match self.shape {
            PickShape::Point { position, .. } => position,
            PickShape::Ray(ray) => ray.origin,
        }
    }
}

/// A node found by a pick
#[derive(Debug, Clone, PartialEq)]
pub struct PickHit {
    /// The shape that was hit
    pub node: NodeId,
    /// Distance along the ray, or from the point to the bounds center
    pub distance: f32,
    /// Transform the shape was tested under
    pub world_transform: Mat4,
}

/// Picking errors
///
/// Both timing and mask violations are caller defects.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PickError {
    /// Pick outside the picking window of a live scene
    #[error("Invalid pick timing: picking is only permitted inside the picking window")]
    InvalidPickTiming,

    /// Pick with an empty mask
    #[error("Not pickable: the pick mask is empty")]
    NotPickable,

    /// Id not present in the scene
    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = PickRequest::ray(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -3.0)).with_mask(PickMask::GEOMETRY);
        assert_eq!(request.origin(), Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(request.mask, PickMask::GEOMETRY);
        match request.shape {
            PickShape::Ray(ray) => assert_eq!(ray.direction, Vec3::new(0.0, 0.0, -1.0)),
            PickShape::Point { .. } => panic!("expected ray"),
        }

        let point = PickRequest::point(Vec3::zeros(), -1.0);
        assert_eq!(point.shape, PickShape::Point { position: Vec3::zeros(), tolerance: 0.0 });
    }

    #[test]
    fn test_masks_default_to_everything() {
        assert_eq!(PickMask::default(), PickMask::all());
        assert!(PickMask::GEOMETRY.intersects(PickMask::all()));
        assert!(!PickMask::GEOMETRY.intersects(PickMask::INTERFACE));
    }
}
