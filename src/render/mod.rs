//! Renderer boundary: a fractal kind plus its [`UniformSet`] in, one RGBA
//! frame out.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fractal::{FractalInstance, FractalKind};
use crate::params::ParamError;
use crate::registry::FractalRegistry;
use crate::uniforms::UniformSet;

pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;

pub use cpu::CpuRenderer;

/// Full-screen quad shared by every fractal pipeline.
pub const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [-1.0, 1.0], [1.0, 1.0], [1.0, -1.0]];
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderBackend {
    #[default]
    Cpu,
    #[cfg(feature = "gpu")]
    Gpu,
}

impl RenderBackend {
    pub fn label(&self) -> &'static str {
        match self {
            RenderBackend::Cpu => "CPU",
            #[cfg(feature = "gpu")]
            RenderBackend::Gpu => "GPU",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ShaderCompileError {
    #[error("cannot read shader {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("shader {} is empty", .path.display())]
    Empty { path: PathBuf },
    #[error("shader {} failed to compile: {message}", .path.display())]
    Compile { path: PathBuf, message: String },
    #[error("uniform layout: {0}")]
    Layout(#[from] ParamError),
    #[error("GPU unavailable: {0}")]
    Device(String),
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("render target has zero size")]
    EmptyTarget,
    #[error("uniform `{0}` is missing or has the wrong type")]
    Uniform(&'static str),
    #[error("no pipeline prepared for {0:?}")]
    NotPrepared(FractalKind),
    #[error("GPU: {0}")]
    Gpu(String),
}

#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub path: PathBuf,
    pub code: String,
}

impl ShaderSource {
    pub fn load(path: &Path) -> Result<Self, ShaderCompileError> {
        let code = fs::read_to_string(path).map_err(|source| ShaderCompileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if code.trim().is_empty() {
            return Err(ShaderCompileError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            code,
        })
    }
}

pub trait Renderer {
    fn backend(&self) -> RenderBackend;

    /// Compiles whatever `fractal` needs. Called once per instance at start-up.
    fn prepare(&mut self, fractal: &FractalInstance) -> Result<(), ShaderCompileError>;

    fn draw(
        &mut self,
        kind: FractalKind,
        uniforms: &UniformSet,
        size: (u32, u32),
    ) -> Result<RgbaImage, RenderError>;
}

pub fn create_renderer(backend: RenderBackend) -> Result<Box<dyn Renderer>, ShaderCompileError> {
    match backend {
        RenderBackend::Cpu => Ok(Box::new(CpuRenderer::new())),
        #[cfg(feature = "gpu")]
        RenderBackend::Gpu => Ok(Box::new(gpu::GpuRenderer::new()?)),
    }
}

/// Prepares every registered fractal; the first failure aborts start-up.
pub fn prepare_all(
    renderer: &mut dyn Renderer,
    registry: &FractalRegistry,
) -> Result<(), ShaderCompileError> {
    for fractal in registry.iter() {
        renderer.prepare(fractal)?;
    }
    info!(
        backend = renderer.backend().label(),
        fractals = registry.len(),
        "renderer ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_covers_clip_space_with_two_triangles() {
        assert_eq!(QUAD_INDICES.len(), 6);
        for corner in [[-1.0, -1.0], [-1.0, 1.0], [1.0, 1.0], [1.0, -1.0]] {
            assert!(QUAD_VERTICES.contains(&corner));
        }
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn missing_and_empty_shaders_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.wgsl");
        assert!(matches!(
            ShaderSource::load(&missing),
            Err(ShaderCompileError::Read { .. })
        ));

        let empty = dir.path().join("empty.wgsl");
        fs::write(&empty, "  \n").unwrap();
        assert!(matches!(
            ShaderSource::load(&empty),
            Err(ShaderCompileError::Empty { .. })
        ));
    }

    #[test]
    fn shipped_shaders_exist_for_every_kind() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
        for kind in FractalKind::ALL {
            let source = ShaderSource::load(&dir.join(kind.shader_file())).unwrap();
            assert!(source.code.contains("fn fs_main"), "{kind:?}");
        }
    }
}
