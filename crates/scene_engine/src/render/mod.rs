//! # Rendering
//!
//! The render side of the per-frame pipeline: the operation stream the sort
//! stage produces, the collaborators a processor drives (graphics context,
//! drawing API, error reporter) and the [`RenderingProcessor`] state machine
//! binding one context to one drawing surface.
//!
//! ## Frame lifecycle
//!
//! ```text
//! prepare_data() ─┬─ Ok ─────────────────────┐
//!                 ├─ Reinit ── reinitialize() ┴─ render() ── swap_buffers() ── disable()
//!                 └─ Failed (reported, frame skipped)
//! ```
//!
//! Context acquisition failures are reported and degrade to a skipped frame;
//! they never surface as errors. Contract violations (rendering while not
//! enabled, a missing owner buffer) return [`RenderError`].

pub mod caps;
mod context;
pub mod headless;
mod ops;
mod processor;
mod renderable;

use thiserror::Error;

pub use caps::{ApiPixelFormat, DisplayCapabilities};
pub use context::{
    ContextStatus, DrawingApi, ErrorReporter, FrameSetup, GraphicsContext, LogErrorReporter, OwnerBuffer,
    SurfaceDescriptor,
};
pub use ops::{GraphicsDetails, GraphicsEnvironmentData, GraphicsRequestData, ProfilingData, ProjectionType, RenderOp};
pub use processor::{EnableState, RenderingProcessor};
pub use renderable::Renderable;

/// Rendering error types
///
/// Contract violations are returned to the caller. Context and backend
/// failures during a frame are not returned; they reach the
/// [`ErrorReporter`] as the cause of a report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Missing or unusable owner buffer
    #[error("Invalid owner buffer: {0}")]
    InvalidOwner(String),

    /// The graphics context for the named surface could not be made current
    #[error("Graphics context unavailable: {0}")]
    ContextUnavailable(String),

    /// A rendering operation was attempted in the wrong state
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Failure inside the graphics binding, such as a failed buffer swap
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
