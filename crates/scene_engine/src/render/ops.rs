//! Per-frame data passed from the sort stage to a rendering processor
//!
//! A request is a pair of parallel arrays: operation codes and, for each
//! code, the renderable it applies to. Every renderable appears as a
//! [`RenderOp::StartRender`] / [`RenderOp::StopRender`] bracket carrying the
//! same details. Everything is owned, so a request can be moved to a render
//! thread as is.

use std::fmt;
use std::sync::Arc;

use crate::foundation::math::{Mat4, Vec3};
use crate::render::Renderable;

/// Operation codes in a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOp {
    /// Open a renderable's bracket: push, multiply, render
    StartRender,
    /// Close a renderable's bracket: post-render, pop
    StopRender,
    /// Everything after this draws in the transparent pass
    TransparencyPass,
}

/// Projection used by a viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionType {
    /// Perspective projection
    #[default]
    Perspective,
    /// Parallel projection
    Orthographic,
}

/// Viewport-wide state for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsEnvironmentData {
    /// Projection kind
    pub projection_type: ProjectionType,
    /// Projection matrix
    pub projection: Mat4,
    /// World-to-eye matrix
    pub view: Mat4,
    /// Viewer position in world space
    pub eye_position: Vec3,
    /// Viewport size in pixels
    pub viewport: (u32, u32),
}

impl Default for GraphicsEnvironmentData {
    fn default() -> Self {
        Self {
            projection_type: ProjectionType::Perspective,
            projection: Mat4::identity(),
            view: Mat4::identity(),
            eye_position: Vec3::zeros(),
            viewport: (0, 0),
        }
    }
}

/// A renderable and the world matrix it is drawn under
#[derive(Clone)]
pub struct GraphicsDetails {
    /// What to draw
    pub renderable: Arc<dyn Renderable>,
    /// Local-to-world transform
    pub transform: Mat4,
}

impl fmt::Debug for GraphicsDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsDetails")
            .field("renderable", &self.renderable.name())
            .field("transform", &self.transform)
            .finish()
    }
}

/// One frame's work for one processor
#[derive(Debug, Clone, Default)]
pub struct GraphicsRequestData {
    /// Viewport state
    pub environment: GraphicsEnvironmentData,
    /// Operation codes in draw order
    pub codes: Vec<RenderOp>,
    /// Details for each code; `None` for markers
    pub details: Vec<Option<GraphicsDetails>>,
}

impl GraphicsRequestData {
    /// Empty request for a viewport
    pub fn new(environment: GraphicsEnvironmentData) -> Self {
        Self {
            environment,
            codes: Vec::new(),
            details: Vec::new(),
        }
    }

    /// Append a start/stop bracket for a renderable
    pub fn push_bracket(&mut self, details: GraphicsDetails) {
        self.codes.push(RenderOp::StartRender);
        self.details.push(Some(details.clone()));
        self.codes.push(RenderOp::StopRender);
        self.details.push(Some(details));
    }

    /// Append a marker operation
    pub fn push_marker(&mut self, op: RenderOp) {
        self.codes.push(op);
        self.details.push(None);
    }

    /// Number of renderable brackets
    pub fn bracket_count(&self) -> usize {
        self.codes.iter().filter(|op| **op == RenderOp::StartRender).count()
    }

    /// Whether the request draws nothing
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Counters accumulated while rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfilingData {
    /// Renderables drawn
    pub renderables: u64,
    /// Triangles submitted
    pub triangles: u64,
}

impl ProfilingData {
    /// Zero the counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
