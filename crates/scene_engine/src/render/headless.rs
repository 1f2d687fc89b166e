//! Headless graphics context
//!
//! A [`RecordingContext`] stands in for a windowing-system context: it
//! records every context and drawing call into a shared [`CallLog`] and can
//! be scripted to report any [`ContextStatus`]. Used by tests and by
//! applications running without a display.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bounds::{BoundingVolume, AABB};
use crate::foundation::math::{Mat4, Vec3};
use crate::render::{ContextStatus, DrawingApi, ErrorReporter, FrameSetup, GraphicsContext, GraphicsEnvironmentData, Renderable};

/// A recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    /// `make_current` and the status it reported
    MakeCurrent(ContextStatus),
    /// Context released
    Release,
    /// Frame presented
    SwapBuffers,
    /// Frame started
    BeginFrame(FrameSetup),
    /// View loaded, with the eye position
    SetView(Vec3),
    /// Model transform saved
    PushTransform,
    /// Matrix multiplied into the model transform
    MultTransform(Mat4),
    /// Model transform restored
    PopTransform,
    /// Transparent pass entered (`true`) or left
    TransparencyPass(bool),
    /// Triangles drawn
    DrawTriangles {
        /// Renderable name
        label: String,
        /// Triangle count
        triangles: u32,
    },
    /// Renderable finished drawing
    PostRender(String),
    /// Frame finished
    EndFrame,
}

impl ApiCall {
    /// Whether this is a call made on behalf of an individual renderable
    pub fn is_per_object(&self) -> bool {
        matches!(
            self,
            Self::PushTransform
                | Self::MultTransform(_)
                | Self::PopTransform
                | Self::DrawTriangles { .. }
                | Self::PostRender(_)
        )
    }
}

/// Shared, cloneable record of calls
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<ApiCall>>>,
}

impl CallLog {
    /// Copy of every call so far
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Number of calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }
}

/// Drawing API that records its calls
#[derive(Debug, Clone, Default)]
pub struct RecordingApi {
    log: CallLog,
}

impl RecordingApi {
    /// Record into `log`
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

impl DrawingApi for RecordingApi {
    fn begin_frame(&mut self, setup: &FrameSetup) {
        self.log.record(ApiCall::BeginFrame(*setup));
    }

    fn set_view(&mut self, environment: &GraphicsEnvironmentData) {
        self.log.record(ApiCall::SetView(environment.eye_position));
    }

    fn push_transform(&mut self) {
        self.log.record(ApiCall::PushTransform);
    }

    fn mult_transform(&mut self, matrix: &Mat4) {
        self.log.record(ApiCall::MultTransform(*matrix));
    }

    fn pop_transform(&mut self) {
        self.log.record(ApiCall::PopTransform);
    }

    fn set_transparency_pass(&mut self, transparent: bool) {
        self.log.record(ApiCall::TransparencyPass(transparent));
    }

    fn draw_triangles(&mut self, label: &str, _vertex_count: u32, triangle_count: u32) {
        self.log.record(ApiCall::DrawTriangles { label: label.to_string(), triangles: triangle_count });
    }

    fn post_render(&mut self, label: &str) {
        self.log.record(ApiCall::PostRender(label.to_string()));
    }

    fn end_frame(&mut self) {
        self.log.record(ApiCall::EndFrame);
    }
}

/// Context without a display
///
/// Without a script the first `make_current` reports
/// [`ContextStatus::CurrentNew`] and later ones [`ContextStatus::Current`].
#[derive(Debug)]
pub struct RecordingContext {
    api: RecordingApi,
    log: CallLog,
    script: VecDeque<ContextStatus>,
    current: bool,
    created: bool,
    swap_failure: Option<String>,
}

impl RecordingContext {
    /// Create a context and the log it records into
    pub fn new() -> (Self, CallLog) {
        let log = CallLog::default();
        let context = Self {
            api: RecordingApi::new(log.clone()),
            log: log.clone(),
            script: VecDeque::new(),
            current: false,
            created: false,
            swap_failure: None,
        };
        (context, log)
    }

    /// Report these statuses from the next `make_current` calls, in order
    pub fn with_script(mut self, statuses: impl IntoIterator<Item = ContextStatus>) -> Self {
        self.script.extend(statuses);
        self
    }

    /// Make every swap fail with `message`
    pub fn with_swap_failure(mut self, message: impl Into<String>) -> Self {
        self.swap_failure = Some(message.into());
        self
    }
}

impl GraphicsContext for RecordingContext {
    fn make_current(&mut self) -> ContextStatus {
        let status = self.script.pop_front().unwrap_or(if self.created {
            ContextStatus::Current
        } else {
            ContextStatus::CurrentNew
        });
        self.current = status != ContextStatus::NotCurrent;
        self.created |= self.current;
        self.log.record(ApiCall::MakeCurrent(status));
        status
    }

    fn is_current(&self) -> bool {
        self.current
    }

    fn release(&mut self) {
        self.current = false;
        self.created = false;
        self.log.record(ApiCall::Release);
    }

    fn swap_buffers(&mut self) -> Result<(), String> {
        match &self.swap_failure {
            Some(message) => Err(message.clone()),
            None => {
                self.log.record(ApiCall::SwapBuffers);
                Ok(())
            }
        }
    }

    fn api(&mut self) -> &mut dyn DrawingApi {
        &mut self.api
    }
}

/// Error reporter that keeps its reports
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    /// Messages reported so far
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn error_report(&self, message: &str, cause: Option<&(dyn std::error::Error + 'static)>) {
        let entry = match cause {
            Some(cause) => format!("{message}: {cause}"),
            None => message.to_string(),
        };
        log::error!("{}", entry);
        self.reports.lock().push(entry);
    }
}

/// Axis-aligned box drawn as twelve triangles
#[derive(Debug, Clone)]
pub struct BoxRenderable {
    name: String,
    bounds: AABB,
}

impl BoxRenderable {
    /// Box spanning `min` to `max`
    pub fn new(name: impl Into<String>, min: Vec3, max: Vec3) -> Self {
        Self { name: name.into(), bounds: AABB::new(min, max) }
    }

    /// Cube centered on the origin
    pub fn cube(name: impl Into<String>, half_extent: f32) -> Self {
        Self::new(name, Vec3::repeat(-half_extent), Vec3::repeat(half_extent))
    }
}

impl Renderable for BoxRenderable {
    fn name(&self) -> &str {
        &self.name
    }

    fn local_bounds(&self) -> BoundingVolume {
        BoundingVolume::Box(self.bounds)
    }

    fn render(&self, api: &mut dyn DrawingApi) -> u64 {
        api.draw_triangles(&self.name, 8, 12);
        12
    }

    fn post_render(&self, api: &mut dyn DrawingApi) {
        api.post_render(&self.name);
    }
}
