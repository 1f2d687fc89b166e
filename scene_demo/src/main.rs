//! Scene Engine Demo
//!
//! Renders a small scene headlessly on two surfaces:
//! - a sign on an axis billboard that keeps turning toward the camera
//! - a tower under an LOD group that drops detail as the camera pulls back
//! - a marker arrow pinned in front of the camera, pointing at the sign
//!
//! Usage: `scene_demo [config.toml | config.ron]`

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use scene_engine::config::ConfigError;
use scene_engine::foundation::logging;
use scene_engine::foundation::math::utils;
use scene_engine::prelude::*;
use scene_engine::render::headless::{ApiCall, BoxRenderable, CallLog, RecordingContext};
use thiserror::Error;

const DEFAULT_FRAMES: u64 = 120;

// Camera dolly, world units per frame
const DOLLY_SPEED: f32 = 0.5;
const START_DISTANCE: f32 = 8.0;

// Marker is shown for the first half of every period
const MARKER_BLINK_FRAMES: u64 = 60;

const TOWER_TURN_DEGREES: f32 = 30.0;

fn sign_position() -> Vec3 {
    Vec3::new(-3.0, 1.0, 0.0)
}

fn tower_position() -> Vec3 {
    Vec3::new(3.0, 0.0, 0.0)
}

#[derive(Error, Debug)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Pick error: {0}")]
    Pick(#[from] PickError),
}

struct DemoScene {
    scene: SceneGraph,
    marker: NodeId,
}

fn shape(scene: &mut SceneGraph, renderable: BoxRenderable) -> Result<NodeId, SceneError> {
    let name = renderable.name().to_string();
    let id = scene.create_shape(Shape::new(Arc::new(renderable)));
    scene.set_name(id, name)?;
    Ok(id)
}

fn build_scene() -> Result<DemoScene, SceneError> {
    let mut scene = SceneGraph::new();
    let root = scene.root();

    // Sign
    let placement = scene.create_transform_group(Transform::from_position(sign_position()).to_matrix());
    let sign = scene.create_billboard(BillboardMode::Axis, Vec3::y());
    let panel = shape(
        &mut scene,
        BoxRenderable::new("sign-panel", Vec3::new(-1.0, -0.5, -0.05), Vec3::new(1.0, 0.5, 0.05)),
    )?;
    scene.add_child(sign, panel)?;
    scene.add_child(placement, sign)?;
    scene.add_child(root, placement)?;

    // Tower
    let turn = Quat::from_axis_angle(&Vec3::y_axis(), utils::deg_to_rad(TOWER_TURN_DEGREES));
    let placement = scene.create_transform_group(Transform::from_position_rotation(tower_position(), turn).to_matrix());
    let tower = scene.create_lod(LodMode::Distance);
    for name in ["tower-high", "tower-medium", "tower-low"] {
        let level = shape(&mut scene, BoxRenderable::new(name, Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 4.0, 1.0)))?;
        scene.add_child(tower, level)?;
    }
    scene.set_lod_range(tower, 0, 15.0)?;
    scene.set_lod_range(tower, 1, 40.0)?;
    scene.add_child(placement, tower)?;
    scene.add_child(root, placement)?;

    // Glass pane in front of everything
    let glass = shape(&mut scene, BoxRenderable::new("glass", Vec3::new(-6.0, -1.0, 2.0), Vec3::new(6.0, 3.0, 2.1)))?;
    scene.set_transparent(glass, true)?;
    scene.add_child(root, glass)?;

    // Marker
    let marker = scene.create_marker();
    let arrow = shape(&mut scene, BoxRenderable::cube("marker-arrow", 0.1))?;
    scene.set_transparent(arrow, true)?;
    scene.set_render_order(arrow, 10)?;
    scene.add_child(marker, arrow)?;
    scene.set_marker_target(marker, Some(sign))?;
    scene.add_child(root, marker)?;

    info!("Built demo scene with {} nodes", scene.len());
    Ok(DemoScene { scene, marker })
}

fn camera(frame: u64) -> View {
    let distance = START_DISTANCE + DOLLY_SPEED * frame as f32;
    View::look_at(Vec3::new(0.0, 2.0, distance), Vec3::zeros(), (1280, 720))
}

fn surface(config: &EngineConfig, name: &str, view: View) -> Result<(RenderPipeline, CallLog), RenderError> {
    let (context, log) = RecordingContext::new();
    let (width, height) = view.viewport;
    let owner = OwnerBuffer::new(Box::new(context), SurfaceDescriptor::new(name, width, height));
    let pipeline = RenderPipeline::standard(config, owner, Arc::new(LogErrorReporter), view)?;
    Ok((pipeline, log))
}

/// Draw calls per label, in label order
fn draw_counts(log: &CallLog) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for call in log.calls() {
        if let ApiCall::DrawTriangles { label, .. } = call {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    counts
}

fn run() -> Result<(), DemoError> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default().with_threading_model(ThreadingModel::ThreadPerSurface),
    };
    config.max_frames = config.max_frames.or(Some(DEFAULT_FRAMES));
    logging::init_with_level(&config.log_level);
    info!("Starting scene demo ({:?})", config.threading_model);

    let DemoScene { scene, marker } = build_scene()?;
    let mut manager = PipelineManager::new(config.clone(), scene)?;

    let (main, main_log) = surface(&config, "main", camera(0))?;
    let overview_view = View::look_at(Vec3::new(0.0, 30.0, 0.1), Vec3::zeros(), (640, 640));
    let (overview, overview_log) = surface(&config, "overview", overview_view)?;
    let main_index = manager.add_pipeline(main)?;
    manager.add_pipeline(overview)?;

    let mut triangles = 0;
    let mut busy = Duration::ZERO;
    let mut failure = None;
    let frames = manager.run(|manager, report| {
        triangles += report.total_triangles();
        busy += report.frame_time;
        let frame = report.frame;
        let update = manager.update(|scene| scene.set_marker_enabled(marker, frame % MARKER_BLINK_FRAMES < MARKER_BLINK_FRAMES / 2));
        if let Err(err) = update {
            failure = Some(DemoError::from(err));
            return false;
        }
        if let Err(err) = manager.set_view(main_index, camera(frame)) {
            failure = Some(DemoError::from(err));
            return false;
        }
        true
    })?;
    if let Some(err) = failure {
        return Err(err);
    }

    let eye = camera(frames).eye;
    let request = PickRequest::ray(eye, (sign_position() - eye).normalize());
    manager.update(|scene| scene.set_marker_enabled(marker, true))?;
    let hits = manager.pick_all(&request)?;

    println!("Rendered {frames} frames, {triangles} triangles, {busy:?} busy");
    for (name, log) in [("main", &main_log), ("overview", &overview_log)] {
        println!("Surface '{name}': {} swaps", log.count(|call| *call == ApiCall::SwapBuffers));
        for (label, count) in draw_counts(log) {
            println!("  {label:<14} drawn {count} times");
        }
    }
    println!("Pick from ({:.1}, {:.1}, {:.1}) toward the sign:", eye.x, eye.y, eye.z);
    let scene = manager.scene().read();
    for hit in &hits {
        let name = scene.get(hit.node).and_then(|node| node.name()).unwrap_or("<unnamed>");
        println!("  {name:<14} at {:.2}", hit.distance);
    }
    drop(scene);

    manager.shutdown();
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        error!("{}", err);
        eprintln!("scene_demo failed: {err}");
        std::process::exit(1);
    }
}
