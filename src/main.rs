/// Headless occluder demo
/// Builds a small city of box occluders and runs the occluder stage for a
/// camera orbiting it, tracking the current and previous camera in the two
/// view slots.
use glam::{Mat4, Quat, Vec3};
use mimalloc::MiMalloc;
use occluder_engine::perf::PerfStats;
use occluder_engine::*;
use std::time::Instant;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const WIDTH: usize = 1280;
const HEIGHT: usize = 720;
const FRAMES: usize = 8;
const TASKS: usize = 8;
/// Smallest on-screen extent worth rasterizing as an occluder
const OCCLUDER_SIZE: f32 = 1.5;

fn build_city() -> Vec<Model> {
    let mut models = Vec::new();

    // Large buildings on a grid
    for gx in -6i32..=6 {
        for gz in -6..=6 {
            let height = 4.0 + ((gx * 7 + gz * 13).rem_euclid(5)) as f32 * 3.0;
            let half = Vec3::new(3.0, height, 3.0);
            let world = Mat4::from_translation(Vec3::new(gx as f32 * 12.0, height, gz as f32 * 12.0));
            models.push(Model::cuboid(half, world));
        }
    }

    // Small props between them, mostly rejected by the size test
    for i in 0..200 {
        let angle = i as f32 * 0.37;
        let radius = 10.0 + (i % 60) as f32;
        let world = Mat4::from_rotation_translation(
            Quat::from_rotation_y(angle),
            Vec3::new(angle.cos() * radius, 0.25, angle.sin() * radius),
        );
        models.push(Model::cuboid(Vec3::splat(0.25), world));
    }

    models
}

fn orbit_camera(frame: usize) -> Camera {
    let angle = frame as f32 * 0.15;
    let mut camera = Camera::new(
        Vec3::new(angle.cos() * 90.0, 25.0, angle.sin() * 90.0),
        WIDTH as f32 / HEIGHT as f32,
    );
    camera.look_at(Vec3::ZERO, Vec3::Y);
    camera
}

fn main() -> OccluderResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("=== Occluder Engine - headless demo ===");

    let sources = build_city();
    let mut scene = OccluderScene::from_sources(&sources)?;
    log::info!(
        "{} occluders, {} triangles",
        scene.len(),
        scene.total_triangle_count()
    );

    let config = BinConfig {
        screen_width: WIDTH,
        screen_height: HEIGHT,
        ..BinConfig::default()
    };
    let mut shared_bins = SharedBinTables::new(&config, TASKS)?;
    let mut single_bins = BinTables::new(&config, 1)?;
    log::info!(
        "{} tiles, {} MT tasks x {} entries per bin, ST {} entries per bin",
        shared_bins.grid().tile_count(),
        shared_bins.task_count(),
        shared_bins.capacity(),
        single_bins.capacity()
    );

    // Setup work is not part of the per-frame report
    FUNCTION_COUNTERS.reset();

    for frame in 1..=FRAMES {
        let frame_start = Instant::now();
        let mut perf = PerfStats::new();

        let current = orbit_camera(frame);
        let previous = orbit_camera(frame - 1);
        let current_frustum = current.extract_frustum();
        let previous_frustum = previous.extract_frustum();
        let current_view = ViewSetup::from_camera(&current, &current_frustum, WIDTH, HEIGHT, OCCLUDER_SIZE);
        let previous_view =
            ViewSetup::from_camera(&previous, &previous_frustum, WIDTH, HEIGHT, OCCLUDER_SIZE);

        let t = Instant::now();
        let summary = scene.classify(&sources, &current_view, ViewSlot::Primary)?;
        scene.classify(&sources, &previous_view, ViewSlot::Secondary)?;
        perf.classify_us = t.elapsed().as_secs_f64() * 1e6;

        let t = Instant::now();
        let vertices = scene.transform_all_slots()?;
        perf.transform_us = t.elapsed().as_secs_f64() * 1e6;

        let t = Instant::now();
        shared_bins.clear();
        single_bins.clear();
        let mt_stats = scene.bin_multi_threaded(&shared_bins, ViewSlot::Primary)?;
        let st_stats = scene.bin_single_threaded(&mut single_bins, ViewSlot::Secondary)?;
        perf.binning_us = t.elapsed().as_secs_f64() * 1e6;
        perf.total_us = frame_start.elapsed().as_secs_f64() * 1e6;

        log::info!(
            "frame {}: visible {} (too small {}), culled {}, {} vertices, \
             MT {} entries / ST {} entries",
            frame,
            summary.significant + summary.too_small,
            summary.too_small,
            summary.not_visible,
            vertices,
            mt_stats.entries,
            st_stats.entries
        );

        // Random access the rasterizer would do for the first non-empty tile
        let grid = *shared_bins.grid();
        if let Some(entry) = (0..TASKS)
            .flat_map(|task| (0..grid.tile_count()).map(move |tile| (task, tile)))
            .find_map(|(task, tile)| shared_bins.entries(task, tile).next())
        {
            let tri = scene.gather(entry, ViewSlot::Primary)?;
            log::debug!("first binned triangle {:?}: {:?}", entry, tri);
        }

        perf.log_summary();
    }

    FUNCTION_COUNTERS.snapshot().log_report();
    Ok(())
}
