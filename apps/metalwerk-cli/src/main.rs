use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Mat4, Vec3};
use metalwerk_frame::FrameTimer;
use metalwerk_render::{
    CameraState, FrameProducer, Renderer, RendererConfig, ThreadedQueue,
};
use metalwerk_render_wgpu::WgpuQueue;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "metalwerk-cli", about = "Drive the metalwerk renderer core")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Print translation, rotation and perspective matrices
    Matrices {
        /// Rotation angle in degrees
        #[arg(long, default_value = "30")]
        angle: f32,
        /// Rotation axis, normalized before use
        #[arg(long, num_args = 3, default_values = ["1", "1", "0"])]
        axis: Vec<f32>,
        /// Vertical field of view in degrees
        #[arg(long, default_value = "65")]
        fov: f32,
        #[arg(long, default_value = "1.7778")]
        aspect: f32,
        #[arg(long, default_value = "0.1")]
        near: f32,
        #[arg(long, default_value = "100")]
        far: f32,
    },
    /// Run frames against a simulated GPU thread
    Simulate {
        #[arg(short, long, default_value = "120")]
        frames: u64,
        /// Frames in flight (overrides the config file)
        #[arg(short, long)]
        buffers: Option<usize>,
        /// Simulated GPU time per frame
        #[arg(long, default_value = "4")]
        gpu_latency_ms: u64,
        /// JSON renderer configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run frames on a headless wgpu device
    Gpu {
        #[arg(short, long, default_value = "120")]
        frames: u64,
        #[arg(short, long, default_value = "3")]
        buffers: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("metalwerk-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("math: {}", metalwerk_math::crate_info());
            println!("frame: {}", metalwerk_frame::crate_info());
            println!("render: {}", metalwerk_render::crate_info());
        }
        Commands::Matrices {
            angle,
            axis,
            fov,
            aspect,
            near,
            far,
        } => {
            let axis = Vec3::from_slice(&axis).normalize_or_zero();
            let rotation = metalwerk_math::try_rotation(angle.to_radians(), axis)?;
            let projection =
                metalwerk_math::try_perspective_right_hand(fov.to_radians(), aspect, near, far)?;

            print_matrix("translation(0, 0, -8)", &metalwerk_math::translation(0.0, 0.0, -8.0));
            print_matrix(&format!("rotation({angle} deg, {axis})"), &rotation);
            print_matrix(
                &format!("perspective_right_hand(fov={fov}, aspect={aspect}, near={near}, far={far})"),
                &projection,
            );
        }
        Commands::Simulate {
            frames,
            buffers,
            gpu_latency_ms,
            config,
        } => {
            let mut config = load_config(config)?;
            if let Some(buffers) = buffers {
                config.buffer_count = buffers;
            }
            println!(
                "Simulated GPU: frames={frames}, buffers={}, latency={gpu_latency_ms}ms",
                config.buffer_count
            );

            let queue = ThreadedQueue::new(Duration::from_millis(gpu_latency_ms));
            let mut renderer = Renderer::new(config, queue)?;
            let timer = run_frames(&mut renderer, frames)?;
            let sync = renderer.synchronizer().clone();
            let queue = renderer.shutdown();

            print_stats(&timer);
            println!(
                "Drained: completed={}, available={}/{}, gpu_log={}",
                sync.completed_frames(),
                sync.available(),
                sync.capacity(),
                queue.completed().len()
            );
        }
        Commands::Gpu { frames, buffers } => {
            let queue = WgpuQueue::headless(buffers).context("creating headless wgpu device")?;
            let config = RendererConfig {
                buffer_count: buffers,
                ..RendererConfig::default()
            };
            let mut renderer = Renderer::new(config, queue)?;
            let timer = run_frames(&mut renderer, frames)?;
            let sync = renderer.synchronizer().clone();
            renderer.shutdown();

            print_stats(&timer);
            println!("Drained: completed={}", sync.completed_frames());
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<RendererConfig> {
    let Some(path) = path else {
        return Ok(RendererConfig::default());
    };
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    RendererConfig::from_json_str(&json)
        .with_context(|| format!("parsing config {}", path.display()))
}

/// Produce `frames` frames, spinning the model and resizing halfway through.
fn run_frames(producer: &mut impl FrameProducer, frames: u64) -> anyhow::Result<FrameTimer> {
    let mut timer = FrameTimer::new(120);
    let mut camera = CameraState::default();

    for i in 0..frames {
        if i == frames / 2 {
            producer.resize(1920, 1080);
        }
        let start = Instant::now();
        let report = producer.produce_frame(&camera)?;
        timer.record(start.elapsed());
        tracing::debug!(frame = report.frame, slot = %report.slot, aspect = report.aspect, "frame produced");
        camera.advance(0.01);
    }
    Ok(timer)
}

fn print_stats(timer: &FrameTimer) {
    println!(
        "Frame time over last {}: avg={:?} min={:?} max={:?} ({:.1} fps)",
        timer.count(),
        timer.average(),
        timer.min(),
        timer.max(),
        timer.fps()
    );
}

fn print_matrix(title: &str, m: &Mat4) {
    println!("{title}:");
    for row in 0..4 {
        let r = m.row(row);
        println!("  [{:9.4} {:9.4} {:9.4} {:9.4}]", r.x, r.y, r.z, r.w);
    }
}
