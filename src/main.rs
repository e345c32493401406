//! Fractal Studio entry point: GUI by default, headless export subcommands.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use eframe::egui;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fractal_studio::animation::NeverCancel;
use fractal_studio::app::StudioApp;
use fractal_studio::config::AppConfig;
use fractal_studio::export;
use fractal_studio::fractal::FractalInstance;
use fractal_studio::params::ParamId;
use fractal_studio::registry::FractalRegistry;
use fractal_studio::render::{self, CpuRenderer, RenderBackend};
use fractal_studio::state;

// ------------------------- CLI -------------------------

#[derive(Parser)]
#[command(name = "Fractal Studio")]
#[command(about = "Interactive 2D/3D fractal explorer")]
struct Args {
    /// Configuration file (.toml / .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Fractal shown at start-up
    #[arg(short, long, global = true)]
    fractal: Option<String>,

    /// State snapshot applied to that fractal
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    /// Headless commands (no UI)
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print every fractal with its navigation mode and controls
    List,
    /// Render one screenshot with the CPU renderer
    Screenshot {
        #[arg(long, default_value = "1280")]
        width: u32,
        #[arg(long, default_value = "720")]
        height: u32,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        high_quality: bool,
    },
    /// Record the animation with the CPU renderer and ffmpeg
    Record {
        /// Seconds; each second is 60 frames
        #[arg(long)]
        duration: Option<f64>,
        #[arg(long, default_value = "1280")]
        width: u32,
        #[arg(long, default_value = "720")]
        height: u32,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Registry with every kind, the requested selection and an optional state.
fn build_registry(
    config: &AppConfig,
    fractal: Option<&str>,
    state_path: Option<&Path>,
) -> Result<FractalRegistry, Box<dyn std::error::Error>> {
    let mut registry = FractalRegistry::with_all_kinds(&config.shader_dir)?;
    registry.set_preview_speed(config.animation_speed);
    if let Some(name) = fractal.or(config.initial_fractal.as_deref()) {
        registry.select(name)?;
    }
    if let Some(path) = state_path {
        let current = registry
            .current_mut()
            .ok_or("no fractal registered")?;
        state::load_from_path(current, path)?;
    }
    Ok(registry)
}

fn current(registry: &mut FractalRegistry) -> Result<&mut FractalInstance, Box<dyn std::error::Error>> {
    Ok(registry.current_mut().ok_or("no fractal registered")?)
}

fn run_headless(
    cmd: Cmd,
    config: &AppConfig,
    mut registry: FractalRegistry,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Cmd::List => {
            for fractal in registry.iter() {
                let params: Vec<&str> = fractal.params().iter().map(|(id, _)| id.name()).collect();
                println!(
                    "{:<16} {:<10} stateful={:<5} params: {}",
                    fractal.name(),
                    fractal.navigation_mode().label(),
                    fractal.is_stateful(),
                    params.join(", ")
                );
            }
        }
        Cmd::Screenshot {
            width,
            height,
            out_dir,
            high_quality,
        } => {
            let fractal = current(&mut registry)?;
            if high_quality {
                fractal
                    .params_mut()
                    .set(ParamId::HighScreenshotQuality, true)?;
            }
            let dir = out_dir.unwrap_or_else(|| config.screenshot_dir.clone());
            let path = export::take_screenshot(fractal, &mut CpuRenderer::new(), (width, height), &dir)?;
            println!("{}", path.display());
        }
        Cmd::Record {
            duration,
            width,
            height,
            out_dir,
        } => {
            let fractal = current(&mut registry)?;
            if let (Some(seconds), Some(engine)) = (duration, fractal.animation_mut()) {
                engine.set_duration(seconds);
            }
            let dir = out_dir.unwrap_or_else(|| config.video_dir.clone());
            let path = export::record_video(
                fractal,
                &mut CpuRenderer::new(),
                &mut config.video.encoder(),
                (width, height),
                &dir,
                config.video.codec.extension(),
                &NeverCancel,
            )?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_gui(config: AppConfig, registry: FractalRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let mut renderer = match render::create_renderer(config.render_backend) {
        Ok(renderer) => renderer,
        Err(err) if config.render_backend != RenderBackend::Cpu => {
            error!("GPU init failed: {err}. Falling back to CPU.");
            render::create_renderer(RenderBackend::Cpu)?
        }
        Err(err) => return Err(err.into()),
    };
    render::prepare_all(renderer.as_mut(), &registry)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 840.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Fractal Studio",
        options,
        Box::new(move |_cc| Box::new(StudioApp::new(config, registry, renderer))),
    )?;
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match AppConfig::discover(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            // Log through the default filter so the failure is still reported.
            init_tracing(&AppConfig::default());
            return Err(err.into());
        }
    };
    init_tracing(&config);
    info!(shader_dir = %config.shader_dir.display(), "starting");
    let registry = build_registry(&config, args.fractal.as_deref(), args.state.as_deref())?;
    match args.cmd {
        Some(cmd) => run_headless(cmd, &config, registry),
        None => run_gui(config, registry),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
