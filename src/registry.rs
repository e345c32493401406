use std::path::Path;

use tracing::{info, warn};

use crate::fractal::{FractalInstance, FractalKind};
use crate::params::ParamError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("fractal `{0}` is already registered")]
    DuplicateFractalName(String),
    #[error("no fractal named `{0}`")]
    UnknownFractal(String),
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Owns every fractal instance; names are unique. The first registered
/// fractal is the initial selection.
#[derive(Debug, Default)]
pub struct FractalRegistry {
    fractals: Vec<FractalInstance>,
    current: Option<usize>,
}

impl FractalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one instance of every kind, shaders looked up in `shader_dir`.
    pub fn with_all_kinds(shader_dir: &Path) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for kind in FractalKind::ALL {
            registry.register(FractalInstance::new(kind, shader_dir)?)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, fractal: FractalInstance) -> Result<(), RegistryError> {
        if self.index_of(fractal.name()).is_some() {
            warn!(name = fractal.name(), "duplicate fractal registration rejected");
            return Err(RegistryError::DuplicateFractalName(fractal.name().to_string()));
        }
        info!(name = fractal.name(), kind = ?fractal.kind(), "fractal registered");
        self.fractals.push(fractal);
        if self.current.is_none() {
            self.current = Some(0);
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.fractals.iter().position(|f| f.name() == name)
    }

    pub fn select(&mut self, name: &str) -> Result<(), RegistryError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| RegistryError::UnknownFractal(name.to_string()))?;
        self.current = Some(index);
        // The newly shown fractal must be painted at least once.
        self.fractals[index].params_mut().request_redraw();
        Ok(())
    }

    pub fn current(&self) -> Option<&FractalInstance> {
        self.current.map(|i| &self.fractals[i])
    }

    pub fn current_mut(&mut self) -> Option<&mut FractalInstance> {
        self.current.map(move |i| &mut self.fractals[i])
    }

    pub fn get(&self, name: &str) -> Option<&FractalInstance> {
        self.index_of(name).map(|i| &self.fractals[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FractalInstance> {
        self.index_of(name).map(move |i| &mut self.fractals[i])
    }

    /// Sets the preview speed of every animatable fractal.
    pub fn set_preview_speed(&mut self, speed: f64) {
        for engine in self.fractals.iter_mut().filter_map(FractalInstance::animation_mut) {
            engine.set_preview_speed(speed);
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.fractals.iter().map(|f| f.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FractalInstance> {
        self.fractals.iter()
    }

    pub fn len(&self) -> usize {
        self.fractals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fractals.is_empty()
    }
}
