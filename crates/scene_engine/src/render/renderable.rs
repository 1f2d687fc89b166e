//! The drawable leaf contract

use crate::bounds::BoundingVolume;
use crate::render::DrawingApi;

/// Anything a shape node can draw
///
/// The processor brackets each renderable: it pushes the transform stack,
/// multiplies in the renderable's world matrix, calls [`render`](Self::render),
/// then later [`post_render`](Self::post_render) and pops the stack.
/// Renderables therefore draw in their local frame.
pub trait Renderable: Send + Sync {
    /// Name used in logs and debug output
    fn name(&self) -> &str;

    /// Bounds in the renderable's local frame
    fn local_bounds(&self) -> BoundingVolume;

    /// Issue draw calls; returns the number of triangles submitted
    fn render(&self, api: &mut dyn DrawingApi) -> u64;

    /// Restore any state changed by [`render`](Self::render)
    fn post_render(&self, _api: &mut dyn DrawingApi) {}
}
