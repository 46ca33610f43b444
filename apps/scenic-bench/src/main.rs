//! Scenic headless churn driver
//!
//! Builds a scene of instanced cubes on the host backend, then ticks it while
//! destroying and respawning actors, moving others, and recording draws. At
//! the end it logs per-buffer usage so fragmentation and growth under churn
//! can be compared between configurations.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p scenic-bench -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use glam::{Mat4, Vec3};
use scenic_core::{CommandBuffering, RenderConfig};
use scenic_gpu::{BufferBackend, BufferUsageReport, DeviceBackend, GpuContextBuilder, HostBackend};
use scenic_render::{RecordingRecorder, World};
use scenic_scene::{
    ActorId, CameraComponent, InstancedTransformComponent, PrimitiveComponent, PrimitiveGeometry,
    PrimitiveSection, TransformComponent,
};
use tracing::info;

/// Bench parameters (from CLI or defaults).
#[derive(Debug, Clone)]
struct BenchParams {
    actors: usize,
    instances: usize,
    ticks: u64,
    churn: usize,
    config_path: Option<String>,
    double_buffered: bool,
    debug_overlay: bool,
    vulkan: bool,
}

impl Default for BenchParams {
    fn default() -> Self {
        Self {
            actors: 256,
            instances: 4,
            ticks: 120,
            churn: 8,
            config_path: None,
            double_buffered: false,
            debug_overlay: false,
            vulkan: false,
        }
    }
}

impl BenchParams {
    fn from_args() -> Self {
        let mut params = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--actors" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        params.actors = v;
                        i += 1;
                    }
                }
                "--instances" => {
                    if let Some(v) = value.and_then(|v| v.parse::<usize>().ok()) {
                        params.instances = v.max(1);
                        i += 1;
                    }
                }
                "--ticks" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        params.ticks = v;
                        i += 1;
                    }
                }
                "--churn" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        params.churn = v;
                        i += 1;
                    }
                }
                "--config" => {
                    if let Some(v) = value {
                        params.config_path = Some(v.clone());
                        i += 1;
                    }
                }
                "--double" => params.double_buffered = true,
                "--debug-overlay" => params.debug_overlay = true,
                "--vulkan" => params.vulkan = true,
                _ => {}
            }
            i += 1;
        }

        params
    }

    fn render_config(&self) -> anyhow::Result<RenderConfig> {
        let mut config = match &self.config_path {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {path}"))?;
                RenderConfig::from_toml_str(&source)?
            }
            None => RenderConfig::default(),
        };
        if self.double_buffered {
            config = config.with_command_buffering(CommandBuffering::Double);
        }
        if self.debug_overlay {
            config = config.with_debug_overlay(true);
        }
        Ok(config)
    }
}

struct Spawner {
    geometry: Arc<PrimitiveGeometry>,
    sections: Vec<PrimitiveSection>,
    instances: usize,
    spawned: usize,
}

impl Spawner {
    fn new(instances: usize) -> Self {
        let (cube, sections) = PrimitiveGeometry::cube(0.5);
        Self {
            geometry: Arc::new(cube),
            sections,
            instances,
            spawned: 0,
        }
    }

    /// Place actors on a grid in front of the camera, extra instances stacked upward.
    fn spawn<B: BufferBackend + 'static>(
        &mut self,
        world: &mut World<B>,
        backend: &mut B,
    ) -> anyhow::Result<ActorId> {
        let n = self.spawned;
        self.spawned += 1;
        let position = Vec3::new((n % 32) as f32 * 2.0 - 32.0, 0.0, -((n / 32) as f32) * 2.0);

        let id = world.spawn_actor(format!("cube{n}"), TransformComponent::from_position(position));
        world.add_component(
            id,
            PrimitiveComponent::new(Arc::clone(&self.geometry), self.sections.clone()).into(),
        )?;
        if self.instances > 1 {
            let locals = (1..self.instances)
                .map(|k| Mat4::from_translation(position + Vec3::Y * k as f32 * 1.5))
                .collect();
            world.add_component(id, InstancedTransformComponent::new(locals).into())?;
        }
        world.attach(id, None, backend)?;
        Ok(id)
    }
}

/// Per-frame hooks of the storage backend under test.
trait BenchBackend: BufferBackend + 'static {
    fn begin_frame(&mut self, frame: u64) -> anyhow::Result<()>;

    fn log_summary(&self);
}

impl BenchBackend for HostBackend {
    fn begin_frame(&mut self, _frame: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            live_bytes = self.live_bytes(),
            created = self.created_count(),
            released = self.released_count(),
            "host backend"
        );
    }
}

impl BenchBackend for DeviceBackend {
    fn begin_frame(&mut self, frame: u64) -> anyhow::Result<()> {
        DeviceBackend::begin_frame(self, frame)?;
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            frame = self.frame_number(),
            pending_deletions = self.pending_deletions(),
            "device backend"
        );
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    scenic_core::logging::init("info");
    let params = BenchParams::from_args();
    let config = params.render_config()?;
    info!(?params, "Scenic churn bench");

    if params.vulkan {
        let context = GpuContextBuilder::new()
            .app_name("scenic-bench")
            .frames_in_flight(config.frames_in_flight)
            .build()?;
        info!(device = context.device_name(), "using Vulkan backend");
        let mut backend = context.buffer_backend();
        run(&params, config, &mut backend)?;
        context.wait_idle()?;
    } else {
        run(&params, config, &mut HostBackend::new())?;
    }
    Ok(())
}

fn run<B: BenchBackend>(params: &BenchParams, config: RenderConfig, backend: &mut B) -> anyhow::Result<()> {
    let mut world = World::new(config)?;

    let camera = world.spawn_actor(
        "camera",
        TransformComponent::from_position(Vec3::new(0.0, 10.0, 40.0)),
    );
    world.add_component(camera, CameraComponent::default().into())?;
    world.attach(camera, None, backend)?;

    let mut spawner = Spawner::new(params.instances);
    let mut live = VecDeque::with_capacity(params.actors);
    for _ in 0..params.actors {
        live.push_back(spawner.spawn(&mut world, backend)?);
    }

    let start = Instant::now();
    let mut recorder = RecordingRecorder::new();
    let mut draws = 0u64;
    for tick in 0..params.ticks {
        backend.begin_frame(tick)?;
        for _ in 0..params.churn.min(live.len()) {
            if let Some(oldest) = live.pop_front() {
                world.destroy(oldest, backend)?;
            }
            live.push_back(spawner.spawn(&mut world, backend)?);
        }
        if let Some(&mover) = live.get((tick as usize) % live.len().max(1)) {
            let offset = (tick as f32 * 0.1).sin();
            world.actor_mut(mover)?.set_position(Vec3::new(offset, offset, 0.0));
        }

        world.tick(backend)?;
        recorder.clear();
        world.render(backend, &mut recorder)?;
        draws += u64::from(recorder.total_draw_count());
    }
    let elapsed = start.elapsed();

    info!(
        ticks = params.ticks,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        per_tick_us = elapsed.as_secs_f64() * 1e6 / params.ticks.max(1) as f64,
        draws,
        "churn finished"
    );

    let reports = world.memory_report();
    for report in &reports {
        info!("{report}");
    }
    info!("{}", BufferUsageReport::total("total", &reports));
    backend.log_summary();

    world.shutdown(backend)?;
    Ok(())
}

fn print_help() {
    eprintln!(
        "Scenic headless churn driver

USAGE:
    cargo run -p scenic-bench -- [OPTIONS]

OPTIONS:
    --actors <N>        Actors spawned up front (default: 256)
    --instances <N>     Instances per actor, the actor included (default: 4)
    --ticks <N>         Frames to run (default: 120)
    --churn <N>         Actors destroyed and respawned per frame (default: 8)
    --config <PATH>     RenderConfig TOML file
    --double            Double-buffer indirect commands
    --debug-overlay     Draw bounding boxes
    --vulkan            Allocate buffers on the first Vulkan 1.3 device
                        instead of host memory
    -h, --help          Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)"
    );
}
