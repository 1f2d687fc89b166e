//! Collaborators driven by a rendering processor

use std::error::Error;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::foundation::math::Mat4;
use crate::render::{DisplayCapabilities, GraphicsEnvironmentData};

/// Outcome of making a graphics context current on the calling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// The context was already current
    Current,
    /// The context is current for the first time, or was lost and recreated
    CurrentNew,
    /// The context could not be made current
    NotCurrent,
}

/// Per-frame state handed to the drawing API before any drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSetup {
    /// Frame counter of the owning processor
    pub frame: u64,
    /// Alpha test threshold
    pub alpha_test_cutoff: f32,
    /// Eye separation for stereo surfaces
    pub stereo_eye_separation: f32,
    /// Whether transparent geometry follows in a separate pass
    pub two_pass_transparency: bool,
}

/// Low-level drawing calls
///
/// The processor issues `begin_frame`, `set_view` and `end_frame` every frame
/// it renders; everything else is driven by the operation stream.
pub trait DrawingApi: Send {
    /// Start a frame
    fn begin_frame(&mut self, setup: &FrameSetup);

    /// Load projection and view for the frame
    fn set_view(&mut self, environment: &GraphicsEnvironmentData);

    /// Save the current model transform
    fn push_transform(&mut self);

    /// Multiply `matrix` into the current model transform
    fn mult_transform(&mut self, matrix: &Mat4);

    /// Restore the last saved model transform
    fn pop_transform(&mut self);

    /// Enter or leave the transparent pass
    fn set_transparency_pass(&mut self, transparent: bool);

    /// Draw indexed triangles in the current model frame
    fn draw_triangles(&mut self, label: &str, vertex_count: u32, triangle_count: u32);

    /// Drawing for the renderable `label` is complete; its transform is
    /// still on the stack
    fn post_render(&mut self, _label: &str) {}

    /// Finish the frame
    fn end_frame(&mut self);
}

/// A graphics context bound to one drawing surface
pub trait GraphicsContext: Send {
    /// Make the context current on the calling thread
    fn make_current(&mut self) -> ContextStatus;

    /// Whether the context is current on the calling thread
    fn is_current(&self) -> bool;

    /// Release the context and its resources
    fn release(&mut self);

    /// Present the back buffer
    fn swap_buffers(&mut self) -> Result<(), String>;

    /// Drawing calls for this context
    fn api(&mut self) -> &mut dyn DrawingApi;
}

/// Read-only description of a drawing surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDescriptor {
    /// Surface name for logs
    pub name: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format chosen for the surface
    pub capabilities: DisplayCapabilities,
}

impl SurfaceDescriptor {
    /// Describe a surface with default capabilities
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            capabilities: DisplayCapabilities::default(),
        }
    }

    /// Width over height
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// The context and surface a processor renders into
pub struct OwnerBuffer {
    /// Context owned by the processor
    pub context: Box<dyn GraphicsContext>,
    /// Shared surface metadata
    pub surface: Arc<SurfaceDescriptor>,
}

impl OwnerBuffer {
    /// Pair a context with its surface
    pub fn new(context: Box<dyn GraphicsContext>, surface: SurfaceDescriptor) -> Self {
        Self {
            context,
            surface: Arc::new(surface),
        }
    }
}

impl std::fmt::Debug for OwnerBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerBuffer").field("surface", &self.surface).finish_non_exhaustive()
    }
}

/// Receives failures that are reported rather than returned
pub trait ErrorReporter: Send + Sync {
    /// Report a failure with an optional cause
    fn error_report(&self, message: &str, cause: Option<&(dyn Error + 'static)>);
}

/// Reporter writing to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn error_report(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        match cause {
            Some(cause) => log::error!("{}: {}", message, cause),
            None => log::error!("{}", message),
        }
    }
}
