//! # Scene Engine
//!
//! A retained-mode 3D scene graph with a cull, sort and render pipeline.
//!
//! ## Features
//!
//! - **Scene Graph**: arena-backed nodes with lazily maintained bounds
//! - **Custom Traversal**: billboards, LOD groups and markers decide their
//!   own children and transforms during culling and picking
//! - **Rendering Processor**: per-surface context lifecycle with reinit
//!   after context loss and single-thread resource release
//! - **Threading**: one thread for every surface, or one thread per surface
//!   with a barrier at each frame boundary
//! - **Headless Rendering**: a recording context for tests and tools
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scene_engine::prelude::*;
//! use scene_engine::render::headless::{BoxRenderable, RecordingContext};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let mut scene = SceneGraph::new();
//!     let cube = scene.create_shape(Shape::new(Arc::new(BoxRenderable::cube("cube", 1.0))));
//!     scene.add_child(scene.root(), cube)?;
//!
//!     let mut manager = PipelineManager::new(config.clone(), scene)?;
//!     let (context, _log) = RecordingContext::new();
//!     let owner = OwnerBuffer::new(Box::new(context), SurfaceDescriptor::new("main", 800, 600));
//!     let view = View::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), (800, 600));
//!     manager.add_pipeline(RenderPipeline::standard(&config, owner, Arc::new(LogErrorReporter), view)?)?;
//!
//!     let report = manager.render_frame()?;
//!     println!("drew {} renderables", report.total_rendered());
//!     Ok(())
//! }
//! ```

pub mod bounds;
pub mod config;
pub mod core;
pub mod cull;
pub mod foundation;
pub mod pick;
pub mod pipeline;
pub mod render;
pub mod scene;
pub mod sort;
pub mod traversal;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        bounds::{BoundingSphere, BoundingVolume, Frustum, FrustumIntersection, Ray, AABB},
        core::config::{Config, CullingConfig, EngineConfig, ProcessorConfig, ThreadingModel},
        foundation::math::{Mat4, Point3, Quat, Transform, Vec3},
        pick::{PickError, PickHit, PickMask, PickRequest},
        pipeline::{FrameReport, PipelineError, PipelineManager, RenderPipeline, ShutdownHandle, View},
        render::{
            EnableState, ErrorReporter, GraphicsContext, LogErrorReporter, OwnerBuffer, Renderable, RenderError,
            SurfaceDescriptor,
        },
        scene::{BillboardMode, LodMode, NodeId, SceneError, SceneGraph, Shape},
    };
}
