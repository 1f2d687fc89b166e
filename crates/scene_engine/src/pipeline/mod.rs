//! # Render Pipelines
//!
//! A [`RenderPipeline`] couples a culler, a sorter and a rendering
//! processor for one surface and runs one frame at a time:
//!
//! ```text
//! prepare ─► (reinit) ─► cull ─► sort ─► queue ─► render ─► swap ─► disable
//! ```
//!
//! The [`PipelineManager`] owns the shared scene, opens the update and
//! picking windows for the application and drives every pipeline once per
//! frame, either sequentially or on one thread per surface.
//!
//! ## Frame rules
//!
//! - A pipeline whose processor fails to enable draws nothing that frame
//!   and tries again on the next one.
//! - The scene is read-locked only while culling and sorting; the sorted
//!   request owns everything the processor needs to draw.
//! - The manager returns from a frame only after every pipeline reported.

mod manager;
mod view;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::RwLock;
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::cull::{CullOutput, Culler, FrustumCuller};
use crate::render::{EnableState, ErrorReporter, OwnerBuffer, ProfilingData, RenderError, RenderResult, RenderingProcessor};
use crate::scene::SceneGraph;
use crate::sort::{Sorter, StateSorter};

pub use manager::{PipelineManager, ShutdownHandle};
pub use view::{Projection, View};

/// Pipeline errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Engine configuration failed validation
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Render thread could not be started
    #[error("Failed to spawn render thread: {0}")]
    ThreadSpawn(String),

    /// Render thread for the named pipeline is gone
    #[error("Render worker '{0}' stopped unexpectedly")]
    WorkerDisconnected(String),

    /// Operation after shutdown
    #[error("Pipeline manager has been shut down")]
    AlreadyShutDown,

    /// No pipeline with this index
    #[error("No pipeline at index {0}")]
    UnknownPipeline(usize),

    /// Rendering processor error
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// What one pipeline did in one frame
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFrameStats {
    /// Pipeline name
    pub name: String,
    /// Result of enabling the processor
    pub enable_state: EnableState,
    /// Renderables that survived culling
    pub culled: usize,
    /// Renderables drawn
    pub rendered: u64,
    /// Triangles drawn
    pub triangles: u64,
    /// Whether the frame was presented
    pub swapped: bool,
}

impl PipelineFrameStats {
    fn skipped(name: &str, enable_state: EnableState) -> Self {
        Self {
            name: name.to_string(),
            enable_state,
            culled: 0,
            rendered: 0,
            triangles: 0,
            swapped: false,
        }
    }
}

/// Statistics for one manager frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Manager frame number, starting at 1
    pub frame: u64,
    /// One entry per pipeline, in the order they were added
    pub pipelines: Vec<PipelineFrameStats>,
    /// Wall time from frame start until every pipeline finished, excluding
    /// frame pacing
    pub frame_time: Duration,
}

impl FrameReport {
    /// Renderables drawn across all pipelines
    pub fn total_rendered(&self) -> u64 {
        self.pipelines.iter().map(|stats| stats.rendered).sum()
    }

    /// Triangles drawn across all pipelines
    pub fn total_triangles(&self) -> u64 {
        self.pipelines.iter().map(|stats| stats.triangles).sum()
    }

    /// Whether any pipeline skipped rendering
    pub fn any_failed(&self) -> bool {
        self.pipelines.iter().any(|stats| stats.enable_state == EnableState::Failed)
    }
}

/// Culler, sorter and processor for one surface
pub struct RenderPipeline {
    name: String,
    culler: Box<dyn Culler>,
    sorter: Box<dyn Sorter>,
    processor: RenderingProcessor,
    view: View,
    cull_output: CullOutput,
    profile: ProfilingData,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("name", &self.name)
            .field("processor", &self.processor)
            .field("view", &self.view)
            .finish()
    }
}

impl RenderPipeline {
    /// Assemble a pipeline from its stages
    pub fn new(
        name: impl Into<String>,
        culler: Box<dyn Culler>,
        sorter: Box<dyn Sorter>,
        processor: RenderingProcessor,
        view: View,
    ) -> Self {
        Self {
            name: name.into(),
            culler,
            sorter,
            processor,
            view,
            cull_output: CullOutput::default(),
            profile: ProfilingData::default(),
        }
    }

    /// Frustum culler and state sorter configured from `config`, drawing
    /// into `owner`
    pub fn standard(
        config: &EngineConfig,
        owner: OwnerBuffer,
        reporter: Arc<dyn ErrorReporter>,
        view: View,
    ) -> RenderResult<Self> {
        let name = owner.surface.name.clone();
        let processor = RenderingProcessor::with_owner(config.processor.clone(), reporter, owner)?;
        Ok(Self::new(
            name,
            Box::new(FrustumCuller::new(&config.culling)),
            Box::new(StateSorter::new(config.processor.two_pass_transparency)),
            processor,
            view,
        ))
    }

    /// Surface name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current view
    pub fn view(&self) -> &View {
        &self.view
    }

    /// View used from the next frame on
    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    /// The rendering processor
    pub fn processor(&self) -> &RenderingProcessor {
        &self.processor
    }

    /// The rendering processor, mutably
    pub fn processor_mut(&mut self) -> &mut RenderingProcessor {
        &mut self.processor
    }

    /// Run one frame against the shared scene
    pub fn run_frame(&mut self, scene: &RwLock<SceneGraph>) -> PipelineFrameStats {
        let enable_state = self.processor.prepare_data();
        if enable_state == EnableState::Reinit {
            self.processor.reinitialize();
        }
        if self.processor.state() != EnableState::Ok {
            debug!("Pipeline '{}' skips frame ({:?})", self.name, enable_state);
            self.processor.disable();
            return PipelineFrameStats::skipped(&self.name, enable_state);
        }

        let request = {
            let scene = scene.read();
            self.culler.cull(&scene, &self.view.view_params(), &mut self.cull_output);
            self.sorter.sort(&self.cull_output, self.view.environment())
        };
        debug!("Pipeline '{}' queued {} renderables", self.name, request.bracket_count());
        self.processor.queue(request);

        self.profile.reset();
        if let Err(err) = self.processor.render(&mut self.profile) {
            warn!("Pipeline '{}' failed to render: {}", self.name, err);
        }
        let swapped = self.processor.swap_buffers();
        self.processor.disable();

        PipelineFrameStats {
            name: self.name.clone(),
            enable_state,
            culled: self.cull_output.len(),
            rendered: self.profile.renderables,
            triangles: self.profile.triangles,
            swapped,
        }
    }

    /// Release the processor's context if it owns the release
    pub fn dispose(&mut self) {
        self.processor.dispose_single_thread_resources();
    }
}
