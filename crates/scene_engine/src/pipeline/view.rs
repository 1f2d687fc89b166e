//! Viewpoints driving a pipeline

use crate::bounds::Frustum;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::render::{GraphicsEnvironmentData, ProjectionType};
use crate::traversal::ViewParams;

/// Projection of a view
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective with a vertical field of view in radians
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
    /// Orthographic with a visible height in world units
    Orthographic {
        /// Visible height in world units
        height: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Self::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Camera and viewport for one pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    /// Camera position
    pub eye: Vec3,
    /// Point looked at
    pub target: Vec3,
    /// Up direction
    pub up: Vec3,
    /// Projection
    pub projection: Projection,
    /// Viewport size in pixels
    pub viewport: (u32, u32),
}

impl View {
    /// Perspective view from `eye` toward `target`
    pub fn look_at(eye: Vec3, target: Vec3, viewport: (u32, u32)) -> Self {
        Self {
            eye,
            target,
            up: Vec3::y(),
            projection: Projection::default(),
            viewport,
        }
    }

    /// Replace the projection
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Width over height
    pub fn aspect_ratio(&self) -> f32 {
        self.viewport.0 as f32 / self.viewport.1.max(1) as f32
    }

    /// World-to-eye matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.eye, self.target, self.up)
    }

    /// Eye-to-clip matrix
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_y, near, far } => Mat4::perspective(fov_y, self.aspect_ratio(), near, far),
            Projection::Orthographic { height, near, far } => {
                let half_height = height * 0.5;
                let half_width = half_height * self.aspect_ratio();
                Mat4::new_orthographic(-half_width, half_width, -half_height, half_height, near, far)
            }
        }
    }

    /// Horizontal field of view in radians; orthographic views use the
    /// angle the visible width subtends at the target distance
    pub fn horizontal_fov(&self) -> f32 {
        match self.projection {
            Projection::Perspective { fov_y, .. } => 2.0 * ((fov_y * 0.5).tan() * self.aspect_ratio()).atan(),
            Projection::Orthographic { height, .. } => {
                let distance = (self.target - self.eye).magnitude().max(f32::EPSILON);
                2.0 * ((height * 0.5 * self.aspect_ratio()) / distance).atan()
            }
        }
    }

    /// Frustum in world space
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&(self.projection_matrix() * self.view_matrix()))
    }

    /// Parameters the cull traversal hands to custom nodes
    pub fn view_params(&self) -> ViewParams {
        ViewParams {
            position: self.eye,
            field_of_view: self.horizontal_fov(),
            viewport_width: self.viewport.0,
            frustum: Some(self.frustum()),
        }
    }

    /// Viewport state for the renderer
    pub fn environment(&self) -> GraphicsEnvironmentData {
        GraphicsEnvironmentData {
            projection_type: match self.projection {
                Projection::Perspective { .. } => ProjectionType::Perspective,
                Projection::Orthographic { .. } => ProjectionType::Orthographic,
            },
            projection: self.projection_matrix(),
            view: self.view_matrix(),
            eye_position: self.eye,
            viewport: self.viewport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_square_viewport_fov_matches_vertical() {
        let view = View::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), (600, 600));
        assert_relative_eq!(view.horizontal_fov(), std::f32::consts::FRAC_PI_4, epsilon = 1e-5);
    }

    #[test]
    fn test_frustum_contains_target() {
        let view = View::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), (800, 600));
        assert!(view.frustum().contains_point(Vec3::zeros()));
        assert!(!view.frustum().contains_point(Vec3::new(0.0, 0.0, 10.0)));

        let ortho = view.with_projection(Projection::Orthographic { height: 4.0, near: 0.1, far: 100.0 });
        assert!(ortho.frustum().contains_point(Vec3::new(1.5, 1.5, 0.0)));
        assert!(!ortho.frustum().contains_point(Vec3::new(0.0, 3.0, 0.0)));
        assert_eq!(ortho.environment().projection_type, ProjectionType::Orthographic);
    }
}
