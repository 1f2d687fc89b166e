//! Frame driver for one or more pipelines

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::core::config::{EngineConfig, ThreadingModel};
use crate::foundation::time::{FramePacer, Stopwatch, Timer};
use crate::pick::{PickError, PickHit, PickRequest, Picker};
use crate::pipeline::{FrameReport, PipelineError, PipelineFrameStats, RenderPipeline, View};
use crate::scene::{self, SceneGraph, SharedScene, UpdatePhase};

/// Commands queued per worker; a frame tick and a view change at most
const COMMAND_QUEUE_DEPTH: usize = 4;

/// How often the frame barrier checks for dead workers
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(50);

enum WorkerCommand {
    Frame,
    SetView(View),
    Stop,
}

type WorkerReport = (usize, PipelineFrameStats);

struct Worker {
    name: String,
    commands: Sender<WorkerCommand>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

enum Pipelines {
    Local(Vec<RenderPipeline>),
    Threaded {
        workers: Vec<Worker>,
        reports_tx: Sender<WorkerReport>,
        reports_rx: Receiver<WorkerReport>,
    },
}

impl Pipelines {
    fn len(&self) -> usize {
        match self {
            Self::Local(pipelines) => pipelines.len(),
            Self::Threaded { workers, .. } => workers.len(),
        }
    }
}

/// Stops a manager from any thread
///
/// Only sets flags: the manager refuses further frames and every processor
/// halts at its next enable. Contexts are released later by the thread
/// that owns them.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    halts: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl ShutdownHandle {
    /// Request shutdown
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::Release);
        for halt in self.halts.lock().iter() {
            halt.store(true, Ordering::Release);
        }
    }

    /// Whether shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    fn register(&self, halt: Arc<AtomicBool>) {
        if self.is_shutdown() {
            halt.store(true, Ordering::Release);
        }
        self.halts.lock().push(halt);
    }
}

/// Owns the scene and drives every pipeline once per frame
pub struct PipelineManager {
    config: EngineConfig,
    scene: SharedScene,
    phase: Arc<UpdatePhase>,
    pipelines: Pipelines,
    picker: Picker,
    pacer: FramePacer,
    frame: u64,
    shutdown: ShutdownHandle,
    stopped: bool,
}

impl PipelineManager {
    /// Take ownership of `scene` and make it live
    pub fn new(config: EngineConfig, mut scene: SceneGraph) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::InvalidConfig)?;

        let phase = Arc::new(UpdatePhase::new());
        scene.attach(phase.clone());
        scene.refresh_bounds();

        let pipelines = match config.threading_model {
            ThreadingModel::SingleThread => Pipelines::Local(Vec::new()),
            ThreadingModel::ThreadPerSurface => {
                let (reports_tx, reports_rx) = unbounded();
                Pipelines::Threaded { workers: Vec::new(), reports_tx, reports_rx }
            }
        };
        info!("Pipeline manager created ({:?})", config.threading_model);

        Ok(Self {
            pacer: FramePacer::new(config.target_fps),
            config,
            scene: scene::shared(scene),
            phase,
            pipelines,
            picker: Picker::new(),
            frame: 0,
            shutdown: ShutdownHandle::default(),
            stopped: false,
        })
    }

    /// Configuration the manager was created with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared scene
    ///
    /// Writes to live nodes through this handle fail outside
    /// [`update`](Self::update).
    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    /// Frames rendered so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of pipelines added
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Handle that requests shutdown from any thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Replace the picker used by the pick calls
    pub fn set_picker(&mut self, picker: Picker) {
        self.picker = picker;
    }

    /// Add a pipeline; returns its index
    ///
    /// With [`ThreadingModel::ThreadPerSurface`] the pipeline moves onto a
    /// new render thread.
    pub fn add_pipeline(&mut self, pipeline: RenderPipeline) -> Result<usize, PipelineError> {
        if self.stopped || self.shutdown.is_shutdown() {
            return Err(PipelineError::AlreadyShutDown);
        }
        self.shutdown.register(pipeline.processor().halt_handle());

        let index = self.pipelines.len();
        match &mut self.pipelines {
            Pipelines::Local(pipelines) => pipelines.push(pipeline),
            Pipelines::Threaded { workers, reports_tx, .. } => {
                let name = pipeline.name().to_string();
                let (commands, command_rx) = bounded(COMMAND_QUEUE_DEPTH);
                let reports = reports_tx.clone();
                let scene = Arc::clone(&self.scene);
                let handle = std::thread::Builder::new()
                    .name(format!("render-{name}"))
                    .spawn(move || run_worker(index, pipeline, scene, command_rx, reports))
                    .map_err(|e| PipelineError::ThreadSpawn(e.to_string()))?;
                workers.push(Worker { name, commands, handle: Some(handle) });
            }
        }
        info!("Added pipeline {}", index);
        Ok(index)
    }

    /// Change the view of pipeline `index`
    pub fn set_view(&mut self, index: usize, view: View) -> Result<(), PipelineError> {
        match &mut self.pipelines {
            Pipelines::Local(pipelines) => {
                let pipeline = pipelines.get_mut(index).ok_or(PipelineError::UnknownPipeline(index))?;
                pipeline.set_view(view);
                Ok(())
            }
            Pipelines::Threaded { workers, .. } => {
                let worker = workers.get(index).ok_or(PipelineError::UnknownPipeline(index))?;
                worker
                    .commands
                    .send(WorkerCommand::SetView(view))
                    .map_err(|_| PipelineError::WorkerDisconnected(worker.name.clone()))
            }
        }
    }

    /// Run `f` with the update window open and the scene write-locked
    ///
    /// Bounds dirtied by `f` are recomputed before the lock is released, so
    /// the next cull sees a consistent scene.
    pub fn update<R>(&self, f: impl FnOnce(&mut SceneGraph) -> R) -> R {
        self.phase.with_update(|| {
            let mut scene = self.scene.write();
            let result = f(&mut scene);
            scene.refresh_bounds();
            result
        })
    }

    /// Closest hit for `request`
    pub fn pick_closest(&mut self, request: &PickRequest) -> Result<Option<PickHit>, PickError> {
        let picker = &mut self.picker;
        let scene = &self.scene;
        self.phase.with_picking(|| picker.pick_closest(&scene.read(), request))
    }

    /// Every hit for `request`, nearest first
    pub fn pick_all(&mut self, request: &PickRequest) -> Result<Vec<PickHit>, PickError> {
        let picker = &mut self.picker;
        let scene = &self.scene;
        self.phase.with_picking(|| picker.pick_all(&scene.read(), request))
    }

    /// Hits for several requests in one picking window
    pub fn pick_batch(&mut self, requests: &[PickRequest]) -> Result<Vec<Vec<PickHit>>, PickError> {
        let picker = &mut self.picker;
        let scene = &self.scene;
        self.phase.with_picking(|| picker.pick_batch(&scene.read(), requests))
    }

    /// Render one frame on every pipeline
    ///
    /// Returns once every pipeline finished the frame.
    pub fn render_frame(&mut self) -> Result<FrameReport, PipelineError> {
        if self.stopped || self.shutdown.is_shutdown() {
            return Err(PipelineError::AlreadyShutDown);
        }
        self.pacer.begin_frame();
        self.frame += 1;
        let mut stopwatch = Stopwatch::start_new();

        let pipelines = match &mut self.pipelines {
            Pipelines::Local(pipelines) => pipelines.iter_mut().map(|p| p.run_frame(&self.scene)).collect(),
            Pipelines::Threaded { workers, reports_rx, .. } => run_threaded_frame(workers, reports_rx)?,
        };
        stopwatch.stop();
        let report = FrameReport { frame: self.frame, pipelines, frame_time: stopwatch.elapsed() };
        debug!(
            "Frame {}: {} renderables, {} triangles in {:?}",
            report.frame,
            report.total_rendered(),
            report.total_triangles(),
            report.frame_time
        );

        self.pacer.end_frame();
        Ok(report)
    }

    /// Render frames until `on_frame` returns false, the configured frame
    /// limit is reached or shutdown is requested; returns the frame count
    pub fn run(&mut self, mut on_frame: impl FnMut(&mut Self, &FrameReport) -> bool) -> Result<u64, PipelineError> {
        let start = self.frame;
        let mut timer = Timer::new();
        loop {
            if let Some(max) = self.config.max_frames {
                if self.frame - start >= max {
                    break;
                }
            }
            if self.shutdown.is_shutdown() {
                break;
            }
            let report = self.render_frame()?;
            timer.update();
            if !on_frame(self, &report) {
                break;
            }
        }
        info!("Ran {} frames at {:.1} fps", timer.frame_count(), timer.average_fps());
        Ok(self.frame - start)
    }

    /// Halt every processor, stop render threads and release contexts
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.shutdown.shutdown();
        self.stopped = true;

        match &mut self.pipelines {
            Pipelines::Local(pipelines) => pipelines.iter_mut().for_each(RenderPipeline::dispose),
            Pipelines::Threaded { workers, .. } => {
                for worker in workers.iter() {
                    if worker.commands.send(WorkerCommand::Stop).is_err() {
                        debug!("Render worker '{}' already stopped", worker.name);
                    }
                }
                for worker in workers.iter_mut() {
                    if let Some(handle) = worker.handle.take() {
                        if handle.join().is_err() {
                            error!("Render worker '{}' panicked", worker.name);
                        }
                    }
                }
            }
        }
        self.scene.write().detach();
        info!("Pipeline manager shut down after {} frames", self.frame);
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_threaded_frame(
    workers: &[Worker],
    reports: &Receiver<WorkerReport>,
) -> Result<Vec<PipelineFrameStats>, PipelineError> {
    for worker in workers {
        worker
            .commands
            .send(WorkerCommand::Frame)
            .map_err(|_| PipelineError::WorkerDisconnected(worker.name.clone()))?;
    }

    let mut stats: Vec<Option<PipelineFrameStats>> = vec![None; workers.len()];
    let mut pending = workers.len();
    while pending > 0 {
        match reports.recv_timeout(WORKER_POLL_INTERVAL) {
            Ok((index, report)) => {
                if let Some(slot) = stats.get_mut(index) {
                    if slot.replace(report).is_none() {
                        pending -= 1;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let dead = workers
                    .iter()
                    .zip(&stats)
                    .find(|(worker, report)| report.is_none() && worker.is_finished());
                if let Some((worker, _)) = dead {
                    return Err(PipelineError::WorkerDisconnected(worker.name.clone()));
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PipelineError::WorkerDisconnected("all".to_string()));
            }
        }
    }
    Ok(stats.into_iter().flatten().collect())
}

fn run_worker(
    index: usize,
    mut pipeline: RenderPipeline,
    scene: SharedScene,
    commands: Receiver<WorkerCommand>,
    reports: Sender<WorkerReport>,
) {
    debug!("Render worker '{}' started", pipeline.name());
    for command in commands.iter() {
        match command {
            WorkerCommand::Frame => {
                let stats = pipeline.run_frame(&scene);
                if reports.send((index, stats)).is_err() {
                    warn!("Manager stopped listening to '{}'", pipeline.name());
                    break;
                }
            }
            WorkerCommand::SetView(view) => pipeline.set_view(view),
            WorkerCommand::Stop => break,
        }
    }
    pipeline.dispose();
    debug!("Render worker '{}' stopped", pipeline.name());
}
