//! Cull, sort and render through the manager in both threading models

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::core::config::{EngineConfig, ProcessorConfig, ThreadingModel};
use crate::foundation::math::{Mat4, Vec3};
use crate::pick::{PickError, PickRequest, Picker};
use crate::pipeline::{PipelineError, PipelineManager, RenderPipeline, View};
use crate::render::headless::{ApiCall, BoxRenderable, CallLog, RecordingContext, RecordingReporter};
use crate::bounds::BoundingVolume;
use crate::render::{ContextStatus, DrawingApi, EnableState, OwnerBuffer, Renderable, SurfaceDescriptor};
use crate::scene::{NodeId, SceneError, SceneGraph, Shape};

struct TestScene {
    scene: SceneGraph,
    near: NodeId,
}

fn cube_at(scene: &mut SceneGraph, name: &str, position: Vec3, transparent: bool) -> NodeId {
    let placement = scene.create_transform_group(Mat4::new_translation(&position));
    let shape = scene.create_shape(Shape::new(Arc::new(BoxRenderable::cube(name, 0.5))).with_transparency(transparent));
    scene.add_child(placement, shape).unwrap();
    scene.add_child(scene.root(), placement).unwrap();
    shape
}

/// A visible opaque cube, a visible transparent cube and one behind the eye
fn test_scene() -> TestScene {
    let mut scene = SceneGraph::new();
    let near = cube_at(&mut scene, "near", Vec3::zeros(), false);
    cube_at(&mut scene, "glass", Vec3::new(1.0, 0.0, 0.0), true);
    cube_at(&mut scene, "behind", Vec3::new(0.0, 0.0, 20.0), false);
    TestScene { scene, near }
}

fn front_view() -> View {
    View::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), (800, 600))
}

fn pipeline(
    config: &EngineConfig,
    name: &str,
    script: &[ContextStatus],
) -> (RenderPipeline, CallLog, RecordingReporter) {
    let (context, log) = RecordingContext::new();
    let context = context.with_script(script.iter().copied());
    let reporter = RecordingReporter::default();
    let owner = OwnerBuffer::new(Box::new(context), SurfaceDescriptor::new(name, 800, 600));
    let pipeline = RenderPipeline::standard(config, owner, Arc::new(reporter.clone()), front_view()).unwrap();
    (pipeline, log, reporter)
}

fn drawn_labels(log: &CallLog) -> Vec<String> {
    log.calls()
        .into_iter()
        .filter_map(|call| match call {
            ApiCall::DrawTriangles { label, .. } => Some(label),
            _ => None,
        })
        .collect()
}

#[test]
fn test_single_thread_frame_culls_sorts_and_renders() {
    let config = EngineConfig::default();
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (pipeline, log, reporter) = pipeline(&config, "main", &[]);
    manager.add_pipeline(pipeline).unwrap();

    let report = manager.render_frame().unwrap();
    assert_eq!(report.frame, 1);
    let stats = &report.pipelines[0];
    assert_eq!(stats.enable_state, EnableState::Reinit);
    assert_eq!(stats.culled, 2);
    assert_eq!(stats.rendered, 2);
    assert_eq!(stats.triangles, 24);
    assert!(stats.swapped);
    assert_eq!(drawn_labels(&log), vec!["near", "glass"]);
    assert!(reporter.reports().is_empty());

    let report = manager.render_frame().unwrap();
    assert_eq!(report.frame, 2);
    assert_eq!(report.pipelines[0].enable_state, EnableState::Ok);
    assert_eq!(report.pipelines[0].rendered, 2);
    assert_eq!(report.total_triangles(), 24);
    assert_eq!(log.count(|call| *call == ApiCall::SwapBuffers), 2);
}

#[test]
fn test_transform_stack_is_balanced_per_frame() {
    let config = EngineConfig::default();
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (pipeline, log, _) = pipeline(&config, "main", &[]);
    manager.add_pipeline(pipeline).unwrap();
    manager.render_frame().unwrap();

    let calls = log.calls();
    let pushes = calls.iter().filter(|call| **call == ApiCall::PushTransform).count();
    let pops = calls.iter().filter(|call| **call == ApiCall::PopTransform).count();
    assert_eq!(pushes, 2);
    assert_eq!(pushes, pops);
    assert_eq!(log.count(|call| matches!(call, ApiCall::PostRender(_))), pushes);
    assert!(matches!(calls.first(), Some(ApiCall::MakeCurrent(ContextStatus::CurrentNew))));
    let end = calls.iter().position(|call| *call == ApiCall::EndFrame).unwrap();
    let swap = calls.iter().position(|call| *call == ApiCall::SwapBuffers).unwrap();
    assert!(end < swap);
}

#[test]
fn test_two_pass_transparency_switches_pass() {
    let config = EngineConfig::default().with_processor(ProcessorConfig::default().with_two_pass_transparency(true));
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (pipeline, log, _) = pipeline(&config, "main", &[]);
    manager.add_pipeline(pipeline).unwrap();
    manager.render_frame().unwrap();

    let calls = log.calls();
    let on = calls.iter().position(|call| *call == ApiCall::TransparencyPass(true)).unwrap();
    let glass = calls
        .iter()
        .position(|call| matches!(call, ApiCall::DrawTriangles { label, .. } if label == "glass"))
        .unwrap();
    let near = calls
        .iter()
        .position(|call| matches!(call, ApiCall::DrawTriangles { label, .. } if label == "near"))
        .unwrap();
    assert!(near < on && on < glass);
    assert_eq!(log.count(|call| *call == ApiCall::TransparencyPass(false)), 1);
}

#[test]
fn test_failed_context_skips_frame_then_recovers() {
    let config = EngineConfig::default();
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (pipeline, log, reporter) = pipeline(&config, "flaky", &[ContextStatus::NotCurrent]);
    manager.add_pipeline(pipeline).unwrap();

    let report = manager.render_frame().unwrap();
    assert!(report.any_failed());
    assert_eq!(report.pipelines[0].enable_state, EnableState::Failed);
    assert_eq!(report.pipelines[0].rendered, 0);
    assert!(!report.pipelines[0].swapped);
    assert!(drawn_labels(&log).is_empty());
    assert_eq!(log.count(|call| *call == ApiCall::SwapBuffers), 0);
    assert_eq!(reporter.reports().len(), 1);

    let report = manager.render_frame().unwrap();
    assert_eq!(report.pipelines[0].enable_state, EnableState::Reinit);
    assert_eq!(report.pipelines[0].rendered, 2);
}

#[test]
fn test_thread_per_surface_runs_every_surface_each_frame() {
    let config = EngineConfig::default()
        .with_threading_model(ThreadingModel::ThreadPerSurface)
        .with_max_frames(3);
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (left, left_log, _) = pipeline(&config, "left", &[]);
    let (right, right_log, _) = pipeline(&config, "right", &[]);
    assert_eq!(manager.add_pipeline(left).unwrap(), 0);
    assert_eq!(manager.add_pipeline(right).unwrap(), 1);

    let mut reports = Vec::new();
    let frames = manager
        .run(|_, report| {
            reports.push(report.clone());
            true
        })
        .unwrap();

    assert_eq!(frames, 3);
    assert_eq!(reports.len(), 3);
    for (index, report) in reports.iter().enumerate() {
        assert_eq!(report.frame, index as u64 + 1);
        let names: Vec<_> = report.pipelines.iter().map(|stats| stats.name.as_str()).collect();
        assert_eq!(names, vec!["left", "right"]);
        assert_eq!(report.total_rendered(), 4);
    }
    assert_eq!(left_log.count(|call| *call == ApiCall::SwapBuffers), 3);
    assert_eq!(right_log.count(|call| *call == ApiCall::SwapBuffers), 3);
}

#[test]
fn test_threaded_set_view_reaches_worker() {
    let config = EngineConfig::default().with_threading_model(ThreadingModel::ThreadPerSurface);
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (main, _, _) = pipeline(&config, "main", &[]);
    manager.add_pipeline(main).unwrap();

    let away = View::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0), (800, 600));
    manager.set_view(0, away).unwrap();
    let report = manager.render_frame().unwrap();
    assert_eq!(report.pipelines[0].culled, 1);
    assert_eq!(report.pipelines[0].rendered, 1);

    assert_eq!(manager.set_view(3, front_view()), Err(PipelineError::UnknownPipeline(3)));
}

#[test]
fn test_scene_writes_only_inside_update() {
    let config = EngineConfig::default();
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (main, log, _) = pipeline(&config, "main", &[]);
    manager.add_pipeline(main).unwrap();

    {
        let mut scene = manager.scene().write();
        let extra = scene.create_shape(Shape::new(Arc::new(BoxRenderable::cube("extra", 0.5))));
        let root = scene.root();
        assert_eq!(scene.add_child(root, extra), Err(SceneError::InvalidWriteTiming));
    }

    manager
        .update(|scene| {
            let extra = scene.create_shape(Shape::new(Arc::new(BoxRenderable::cube("extra", 0.5))));
            let root = scene.root();
            scene.add_child(root, extra)
        })
        .unwrap();
    assert!(!manager.scene().read().bounds_dirty());

    let report = manager.render_frame().unwrap();
    assert_eq!(report.pipelines[0].rendered, 3);
    assert!(drawn_labels(&log).contains(&"extra".to_string()));
}

#[test]
fn test_picking_only_inside_picking_window() {
    let TestScene { scene, near } = test_scene();
    let mut manager = PipelineManager::new(EngineConfig::default(), scene).unwrap();
    let request = PickRequest::ray(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));

    let hit = manager.pick_closest(&request).unwrap().unwrap();
    assert_eq!(hit.node, near);
    assert!((hit.distance - 4.5).abs() < 1e-4);
    assert_eq!(manager.pick_all(&request).unwrap().len(), 1);
    let batch = manager.pick_batch(&[request, request]).unwrap();
    assert_eq!(batch.len(), 2);

    let mut picker = Picker::new();
    let scene = manager.scene().read();
    assert_eq!(picker.pick_all(&scene, &request), Err(PickError::InvalidPickTiming));
}

#[test]
fn test_shutdown_handle_only_sets_flags() {
    let config = EngineConfig::default()
        .with_threading_model(ThreadingModel::ThreadPerSurface)
        .with_processor(ProcessorConfig::default().with_single_thread_resource_release(true));
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (main, log, _) = pipeline(&config, "main", &[]);
    let halt = main.processor().halt_handle();
    manager.add_pipeline(main).unwrap();
    manager.render_frame().unwrap();

    let handle = manager.shutdown_handle();
    std::thread::spawn(move || handle.shutdown()).join().unwrap();

    assert!(halt.load(Ordering::Acquire));
    assert_eq!(log.count(|call| *call == ApiCall::Release), 0);
    assert_eq!(manager.render_frame(), Err(PipelineError::AlreadyShutDown));

    drop(manager);
    assert_eq!(log.count(|call| *call == ApiCall::Release), 1);
}

#[test]
fn test_shutdown_releases_single_thread_contexts() {
    let config = EngineConfig::default()
        .with_processor(ProcessorConfig::default().with_single_thread_resource_release(true));
    let mut manager = PipelineManager::new(config.clone(), test_scene().scene).unwrap();
    let (main, log, _) = pipeline(&config, "main", &[]);
    manager.add_pipeline(main).unwrap();
    manager.render_frame().unwrap();

    manager.shutdown();
    manager.shutdown();
    assert_eq!(log.count(|call| *call == ApiCall::Release), 1);
    assert!(!manager.scene().read().is_live());
    let (late, _, _) = pipeline(&config, "late", &[]);
    assert!(matches!(manager.add_pipeline(late), Err(PipelineError::AlreadyShutDown)));
}

/// Renderable whose draw call brings its render thread down
struct LostDevice;

impl Renderable for LostDevice {
    fn name(&self) -> &str {
        "lost-device"
    }

    fn local_bounds(&self) -> BoundingVolume {
        BoundingVolume::from_sphere(Vec3::zeros(), 0.5)
    }

    fn render(&self, _api: &mut dyn DrawingApi) -> u64 {
        panic!("device lost while drawing");
    }
}

#[test]
fn test_shutdown_after_worker_died() {
    let config = EngineConfig::default().with_threading_model(ThreadingModel::ThreadPerSurface);
    let mut scene = SceneGraph::new();
    let shape = scene.create_shape(Shape::new(Arc::new(LostDevice)));
    scene.add_child(scene.root(), shape).unwrap();
    let mut manager = PipelineManager::new(config.clone(), scene).unwrap();
    let (main, _, _) = pipeline(&config, "main", &[]);
    manager.add_pipeline(main).unwrap();

    assert_eq!(manager.render_frame(), Err(PipelineError::WorkerDisconnected("main".to_string())));
    manager.shutdown();
    assert!(!manager.scene().read().is_live());
    assert_eq!(manager.render_frame(), Err(PipelineError::AlreadyShutDown));
}

#[test]
fn test_invalid_config_rejected() {
    let config = EngineConfig::default().with_processor(ProcessorConfig::default().with_alpha_test_cutoff(2.0));
    assert!(matches!(
        PipelineManager::new(config, SceneGraph::new()),
        Err(PipelineError::InvalidConfig(_))
    ));
}
