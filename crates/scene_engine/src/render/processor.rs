//! # Rendering Processor
//!
//! Binds one graphics context to one drawing surface and runs the
//! per-frame enable, render, swap, disable lifecycle for it.
//!
//! ## Enable states
//!
//! [`prepare_data`](RenderingProcessor::prepare_data) maps the context's
//! [`ContextStatus`] onto an [`EnableState`]:
//!
//! | context | state |
//! |---|---|
//! | `Current` | `Ok` |
//! | `CurrentNew` | `Reinit` |
//! | `NotCurrent` | `Failed` (reported) |
//!
//! Once halted, every call reports `Failed` without touching the context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::core::config::ProcessorConfig;
use crate::render::{
    ContextStatus, ErrorReporter, FrameSetup, GraphicsRequestData, OwnerBuffer, ProfilingData, RenderError,
    RenderOp, RenderResult, SurfaceDescriptor,
};

/// Outcome of enabling a processor for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableState {
    /// Ready to render
    Ok,
    /// Context is new; cached context resources must be recreated first
    Reinit,
    /// Nothing may be drawn this frame
    Failed,
}

type ReinitListener = Box<dyn FnMut() + Send>;

/// Drives one surface's graphics context
pub struct RenderingProcessor {
    config: ProcessorConfig,
    owner: Option<OwnerBuffer>,
    reporter: Arc<dyn ErrorReporter>,
    state: EnableState,
    halted: Arc<AtomicBool>,
    enabled_this_frame: bool,
    released: bool,
    pending: Option<GraphicsRequestData>,
    reinit_listeners: Vec<ReinitListener>,
    frame: u64,
}

impl std::fmt::Debug for RenderingProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderingProcessor")
            .field("surface", &self.surface().map(|s| s.name.as_str()))
            .field("state", &self.state)
            .field("halted", &self.is_halted())
            .field("frame", &self.frame)
            .finish()
    }
}

impl RenderingProcessor {
    /// Create a processor with no owner buffer
    pub fn new(config: ProcessorConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            config,
            owner: None,
            reporter,
            state: EnableState::Failed,
            halted: Arc::new(AtomicBool::new(false)),
            enabled_this_frame: false,
            released: false,
            pending: None,
            reinit_listeners: Vec::new(),
            frame: 0,
        }
    }

    /// Create a processor bound to `owner`
    pub fn with_owner(config: ProcessorConfig, reporter: Arc<dyn ErrorReporter>, owner: OwnerBuffer) -> RenderResult<Self> {
        let mut processor = Self::new(config, reporter);
        processor.set_owner_buffer(Some(owner))?;
        Ok(processor)
    }

    /// Bind the context and surface to render into
    ///
    /// Fails with [`RenderError::InvalidOwner`] for `None` or a surface
    /// without area; the previous owner is kept then. A previous owner that
    /// is replaced has its context released unless that already happened.
    pub fn set_owner_buffer(&mut self, owner: Option<OwnerBuffer>) -> RenderResult<()> {
        let owner = owner.ok_or_else(|| RenderError::InvalidOwner("no owner buffer given".to_string()))?;
        if owner.surface.width == 0 || owner.surface.height == 0 {
            return Err(RenderError::InvalidOwner(format!(
                "surface '{}' has no area ({}x{})",
                owner.surface.name, owner.surface.width, owner.surface.height
            )));
        }
        if let Some(mut previous) = self.owner.take() {
            if !self.released {
                previous.context.release();
            }
            info!("Processor unbound from surface '{}'", previous.surface.name);
        }
        info!("Processor bound to surface '{}'", owner.surface.name);
        self.owner = Some(owner);
        self.state = EnableState::Failed;
        self.enabled_this_frame = false;
        self.released = false;
        Ok(())
    }

    /// Surface metadata, when bound
    pub fn surface(&self) -> Option<&Arc<SurfaceDescriptor>> {
        self.owner.as_ref().map(|owner| &owner.surface)
    }

    /// Options the processor was created with
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// State set by the last `prepare_data` or `reinitialize`
    pub fn state(&self) -> EnableState {
        self.state
    }

    /// Frames rendered so far
    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    /// Request termination; every later frame fails without touching the context
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Whether termination was requested
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Flag that halts this processor when set, usable from any thread
    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halted)
    }

    /// Run `listener` whenever the context has to be reinitialised
    pub fn add_reinit_listener(&mut self, listener: impl FnMut() + Send + 'static) {
        self.reinit_listeners.push(Box::new(listener));
    }

    /// Enable the processor for a frame by making its context current
    pub fn prepare_data(&mut self) -> EnableState {
        self.enabled_this_frame = false;
        if self.is_halted() {
            self.state = EnableState::Failed;
            return self.state;
        }

        let Some(owner) = self.owner.as_mut() else {
            self.reporter.error_report("Rendering processor has no owner buffer", None);
            self.state = EnableState::Failed;
            return self.state;
        };

        self.state = match owner.context.make_current() {
            ContextStatus::Current => EnableState::Ok,
            ContextStatus::CurrentNew => {
                debug!("Context for '{}' is new, reinitialisation needed", owner.surface.name);
                EnableState::Reinit
            }
            ContextStatus::NotCurrent => {
                let cause = RenderError::ContextUnavailable(owner.surface.name.clone());
                let message = "Unable to make the graphics context current";
                error!("{}: {}", message, cause);
                self.reporter.error_report(message, Some(&cause));
                EnableState::Failed
            }
        };
        self.enabled_this_frame = self.state != EnableState::Failed;
        self.released = false;
        self.state
    }

    /// Recreate context-dependent resources after [`EnableState::Reinit`]
    ///
    /// Runs the reinit listeners and marks the processor ready. Issues no
    /// drawing calls.
    pub fn reinitialize(&mut self) {
        if self.state != EnableState::Reinit {
            warn!("Reinitialize called in state {:?}", self.state);
        }
        for listener in &mut self.reinit_listeners {
            listener();
        }
        if self.enabled_this_frame {
            self.state = EnableState::Ok;
        }
    }

    /// Queue the request drawn by the next [`render`](Self::render)
    pub fn queue(&mut self, request: GraphicsRequestData) {
        self.pending = Some(request);
    }

    /// Draw the queued request
    ///
    /// Fails with [`RenderError::RenderingFailed`] unless the processor is
    /// in [`EnableState::Ok`]. Each `StartRender` pushes the transform
    /// stack, multiplies in the renderable's matrix and renders it; each
    /// `StopRender` post-renders and pops.
    pub fn render(&mut self, profile: &mut ProfilingData) -> RenderResult<()> {
        if self.state != EnableState::Ok {
            return Err(RenderError::RenderingFailed(format!("processor is not enabled ({:?})", self.state)));
        }
        let owner = self
            .owner
            .as_mut()
            .ok_or_else(|| RenderError::InvalidOwner("no owner buffer bound".to_string()))?;
        let request = self.pending.take().unwrap_or_default();

        self.frame += 1;
        let setup = FrameSetup {
            frame: self.frame,
            alpha_test_cutoff: self.config.alpha_test_cutoff,
            stereo_eye_separation: self.config.stereo_eye_separation,
            two_pass_transparency: self.config.two_pass_transparency,
        };

        let api = owner.context.api();
        api.begin_frame(&setup);
        api.set_view(&request.environment);

        let mut transparent = false;
        for (code, details) in request.codes.iter().zip(&request.details) {
            match (code, details) {
                (RenderOp::StartRender, Some(details)) => {
                    api.push_transform();
                    api.mult_transform(&details.transform);
                    profile.triangles += details.renderable.render(api);
                    profile.renderables += 1;
                }
                (RenderOp::StopRender, Some(details)) => {
                    details.renderable.post_render(api);
                    api.pop_transform();
                }
                (RenderOp::TransparencyPass, _) => {
                    api.set_transparency_pass(true);
                    transparent = true;
                }
                (code, None) => warn!("Skipping {:?} without details", code),
            }
        }
        if transparent {
            api.set_transparency_pass(false);
        }
        api.end_frame();
        Ok(())
    }

    /// Present the frame
    ///
    /// Does nothing unless the processor was enabled this frame and its
    /// context is current. Swap failures are reported. Returns whether a
    /// swap happened.
    pub fn swap_buffers(&mut self) -> bool {
        if !self.enabled_this_frame {
            return false;
        }
        let Some(owner) = self.owner.as_mut() else {
            return false;
        };
        if !owner.context.is_current() {
            return false;
        }
        match owner.context.swap_buffers() {
            Ok(()) => true,
            Err(message) => {
                let cause = RenderError::BackendError(message);
                let message = format!("Buffer swap failed for '{}'", owner.surface.name);
                self.reporter.error_report(&message, Some(&cause));
                false
            }
        }
    }

    /// End the frame; the next frame must be enabled again
    pub fn disable(&mut self) {
        self.enabled_this_frame = false;
    }

    /// Release the context if this processor owns its release
    ///
    /// Only acts when configured for single-threaded resource release, and
    /// releases at most once per binding.
    pub fn dispose_single_thread_resources(&mut self) {
        if !self.config.single_thread_resource_release || self.released {
            return;
        }
        if let Some(owner) = self.owner.as_mut() {
            owner.context.release();
            self.released = true;
            self.enabled_this_frame = false;
            self.state = EnableState::Failed;
            info!("Released graphics context for '{}'", owner.surface.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::headless::{ApiCall, BoxRenderable, CallLog, RecordingContext, RecordingReporter};
    use crate::render::{GraphicsDetails, GraphicsEnvironmentData, SurfaceDescriptor};
    use std::sync::atomic::AtomicUsize;

    fn processor_with(
        config: ProcessorConfig,
        script: &[ContextStatus],
    ) -> (RenderingProcessor, CallLog, RecordingReporter) {
        let (context, log) = RecordingContext::new();
        let context = context.with_script(script.iter().copied());
        let reporter = RecordingReporter::default();
        let owner = OwnerBuffer::new(Box::new(context), SurfaceDescriptor::new("test", 640, 480));
        let processor = RenderingProcessor::with_owner(config, Arc::new(reporter.clone()), owner).unwrap();
        (processor, log, reporter)
    }

    fn bracket(name: &str, offset: f32) -> GraphicsDetails {
        GraphicsDetails {
            renderable: Arc::new(BoxRenderable::cube(name, 1.0)),
            transform: Mat4::new_translation(&Vec3::new(offset, 0.0, 0.0)),
        }
    }

    #[test]
    fn test_context_status_maps_to_enable_state() {
        let script = [ContextStatus::Current, ContextStatus::CurrentNew, ContextStatus::NotCurrent];
        let (mut processor, _, reporter) = processor_with(ProcessorConfig::default(), &script);
        assert_eq!(processor.prepare_data(), EnableState::Ok);
        assert_eq!(processor.prepare_data(), EnableState::Reinit);
        assert!(reporter.reports().is_empty());
        assert_eq!(processor.prepare_data(), EnableState::Failed);
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("Graphics context unavailable: test"));
    }

    #[test]
    fn test_halt_short_circuits_without_touching_context() {
        let (mut processor, log, _) = processor_with(ProcessorConfig::default(), &[]);
        let handle = processor.halt_handle();
        handle.store(true, Ordering::Release);
        for _ in 0..3 {
            assert_eq!(processor.prepare_data(), EnableState::Failed);
        }
        assert!(log.calls().is_empty());
        assert!(processor.render(&mut ProfilingData::default()).is_err());
    }

    #[test]
    fn test_reinitialize_issues_no_drawing_calls() {
        let (mut processor, log, _) = processor_with(ProcessorConfig::default(), &[]);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        processor.add_reinit_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(processor.prepare_data(), EnableState::Reinit);
        log.clear();
        processor.reinitialize();
        assert_eq!(processor.state(), EnableState::Ok);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_render_refused_unless_enabled() {
        let (mut processor, log, _) = processor_with(ProcessorConfig::default(), &[]);
        assert!(matches!(processor.render(&mut ProfilingData::default()), Err(RenderError::RenderingFailed(_))));
        assert_eq!(processor.prepare_data(), EnableState::Reinit);
        assert!(processor.render(&mut ProfilingData::default()).is_err());
        assert_eq!(log.count(|call| call.is_per_object() || *call == ApiCall::EndFrame), 0);
    }

    #[test]
    fn test_empty_request_issues_only_frame_setup() {
        let (mut processor, log, _) = processor_with(ProcessorConfig::default(), &[ContextStatus::Current]);
        processor.prepare_data();
        log.clear();

        let mut profile = ProfilingData::default();
        processor.render(&mut profile).unwrap();
        assert_eq!(profile, ProfilingData::default());
        assert_eq!(log.count(ApiCall::is_per_object), 0);
        let calls = log.calls();
        assert!(matches!(calls.first(), Some(ApiCall::BeginFrame(_))));
        assert_eq!(calls.last(), Some(&ApiCall::EndFrame));
    }

    #[test]
    fn test_brackets_render_in_queue_order_under_own_transform() {
        let (mut processor, log, _) = processor_with(ProcessorConfig::default(), &[ContextStatus::Current]);
        let mut request = GraphicsRequestData::new(GraphicsEnvironmentData::default());
        let first = bracket("first", 1.0);
        let second = bracket("second", 2.0);
        request.push_bracket(first.clone());
        request.push_bracket(second.clone());
        processor.queue(request);

        processor.prepare_data();
        log.clear();
        let mut profile = ProfilingData::default();
        processor.render(&mut profile).unwrap();
        assert_eq!(profile, ProfilingData { renderables: 2, triangles: 24 });

        let per_object: Vec<ApiCall> = log.calls().into_iter().filter(ApiCall::is_per_object).collect();
        assert_eq!(
            per_object,
            vec![
                ApiCall::PushTransform,
                ApiCall::MultTransform(first.transform),
                ApiCall::DrawTriangles { label: "first".into(), triangles: 12 },
                ApiCall::PostRender("first".into()),
                ApiCall::PopTransform,
                ApiCall::PushTransform,
                ApiCall::MultTransform(second.transform),
                ApiCall::DrawTriangles { label: "second".into(), triangles: 12 },
                ApiCall::PostRender("second".into()),
                ApiCall::PopTransform,
            ]
        );
    }

    #[test]
    fn test_frame_setup_carries_processor_options() {
        let config = ProcessorConfig::default().with_alpha_test_cutoff(0.5).with_two_pass_transparency(true);
        let (mut processor, log, _) = processor_with(config, &[ContextStatus::Current]);
        let mut request = GraphicsRequestData::default();
        request.push_marker(RenderOp::TransparencyPass);
        processor.queue(request);
        processor.prepare_data();
        processor.render(&mut ProfilingData::default()).unwrap();

        let calls = log.calls();
        let setup = calls.iter().find_map(|call| match call {
            ApiCall::BeginFrame(setup) => Some(*setup),
            _ => None,
        });
        let setup = setup.unwrap();
        assert_eq!(setup.alpha_test_cutoff, 0.5);
        assert!(setup.two_pass_transparency);
        assert!(calls.contains(&ApiCall::TransparencyPass(true)));
        assert!(calls.contains(&ApiCall::TransparencyPass(false)));
    }

    #[test]
    fn test_swap_only_after_successful_enable() {
        let script = [ContextStatus::NotCurrent, ContextStatus::Current];
        let (mut processor, log, _) = processor_with(ProcessorConfig::default(), &script);
        assert!(!processor.swap_buffers());

        processor.prepare_data();
        assert!(!processor.swap_buffers());

        processor.prepare_data();
        assert!(processor.swap_buffers());
        processor.disable();
        assert!(!processor.swap_buffers());
        assert_eq!(log.count(|call| *call == ApiCall::SwapBuffers), 1);
    }

    #[test]
    fn test_swap_failure_is_reported() {
        let (context, _) = RecordingContext::new();
        let context = context.with_swap_failure("surface lost");
        let reporter = RecordingReporter::default();
        let owner = OwnerBuffer::new(Box::new(context), SurfaceDescriptor::new("lost", 8, 8));
        let mut processor =
            RenderingProcessor::with_owner(ProcessorConfig::default(), Arc::new(reporter.clone()), owner).unwrap();
        processor.prepare_data();
        assert!(!processor.swap_buffers());
        assert_eq!(reporter.reports(), vec!["Buffer swap failed for 'lost': Backend error: surface lost".to_string()]);
    }

    #[test]
    fn test_dispose_respects_threading_mode() {
        let (mut shared, shared_log, _) = processor_with(ProcessorConfig::default(), &[]);
        shared.prepare_data();
        shared.dispose_single_thread_resources();
        assert_eq!(shared_log.count(|call| *call == ApiCall::Release), 0);

        let config = ProcessorConfig::default().with_single_thread_resource_release(true);
        let (mut owned, owned_log, _) = processor_with(config, &[]);
        owned.prepare_data();
        owned.dispose_single_thread_resources();
        owned.dispose_single_thread_resources();
        assert_eq!(owned_log.count(|call| *call == ApiCall::Release), 1);
    }

    #[test]
    fn test_owner_buffer_must_be_valid() {
        let mut processor = RenderingProcessor::new(ProcessorConfig::default(), Arc::new(RecordingReporter::default()));
        assert!(matches!(processor.set_owner_buffer(None), Err(RenderError::InvalidOwner(_))));

        let (context, _) = RecordingContext::new();
        let flat = OwnerBuffer::new(Box::new(context), SurfaceDescriptor::new("flat", 0, 10));
        assert!(matches!(processor.set_owner_buffer(Some(flat)), Err(RenderError::InvalidOwner(_))));
        assert!(processor.surface().is_none());
    }

    #[test]
    fn test_rebinding_releases_previous_context() {
        let (mut processor, old_log, _) = processor_with(ProcessorConfig::default(), &[]);
        processor.prepare_data();

        let (context, new_log) = RecordingContext::new();
        let owner = OwnerBuffer::new(Box::new(context), SurfaceDescriptor::new("next", 320, 240));
        processor.set_owner_buffer(Some(owner)).unwrap();
        assert_eq!(old_log.count(|call| *call == ApiCall::Release), 1);
        assert_eq!(processor.surface().map(|s| s.name.as_str()), Some("next"));
        assert_eq!(processor.state(), EnableState::Failed);

        assert_eq!(processor.prepare_data(), EnableState::Reinit);
        assert_eq!(new_log.count(|call| matches!(call, ApiCall::MakeCurrent(_))), 1);
        assert_eq!(old_log.count(|call| matches!(call, ApiCall::MakeCurrent(_))), 1);
    }

    #[test]
    fn test_rebinding_after_dispose_does_not_release_twice() {
        let config = ProcessorConfig::default().with_single_thread_resource_release(true);
        let (mut processor, old_log, _) = processor_with(config, &[]);
        processor.prepare_data();
        processor.dispose_single_thread_resources();

        let (context, _) = RecordingContext::new();
        let owner = OwnerBuffer::new(Box::new(context), SurfaceDescriptor::new("next", 320, 240));
        processor.set_owner_buffer(Some(owner)).unwrap();
        assert_eq!(old_log.count(|call| *call == ApiCall::Release), 1);
    }
}
