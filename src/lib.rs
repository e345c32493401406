//! Fractal Studio: interactive 2D/3D fractal explorer.
//! - per-fractal typed parameter stores built from composable capabilities
//! - pan/zoom/rotate, orbit and fly navigation
//! - start→end animation preview and deterministic 60 fps recording
//! - flat JSON state snapshots, screenshots, ffmpeg video export
//! - CPU (rayon) and optional wgpu renderers fed by one named uniform set

pub mod animation;
pub mod app;
pub mod capability;
pub mod config;
pub mod coords;
pub mod export;
pub mod fractal;
pub mod navigation;
pub mod params;
pub mod position_log;
pub mod registry;
pub mod render;
pub mod state;
pub mod uniforms;
