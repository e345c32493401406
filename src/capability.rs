//! Composable fractal capabilities.
//!
//! A fractal is described by a [`Capabilities`] record. Each present
//! capability registers its parameters, contributes UI controls and
//! contributes uniforms. Contributions are concatenated in one fixed order:
//!
//! stateful → navigation → colour → background → antialias → iterations →
//! screenshot → kind-specific extras → animation.

use std::f64::consts::PI;

use crate::animation::AnimationSpec;
use crate::navigation::NavigationMode;
use crate::params::{ParamError, ParamId, ParameterStore, Point2, Point3, Rgba};
use crate::uniforms::{UniformSet, UniformValue};

/// Buttons the front end wires to fractal-level operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractalAction {
    SaveState,
    LoadState,
    Screenshot,
    SavePosition,
    GoToPosition,
}

impl FractalAction {
    pub fn label(&self) -> &'static str {
        match self {
            FractalAction::SaveState => "Save state",
            FractalAction::LoadState => "Load state",
            FractalAction::Screenshot => "Screenshot",
            FractalAction::SavePosition => "Save position",
            FractalAction::GoToPosition => "Go to position",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Slider {
        param: ParamId,
        min: f64,
        max: f64,
        logarithmic: bool,
    },
    IntSlider {
        param: ParamId,
        min: i64,
        max: i64,
    },
    Checkbox {
        param: ParamId,
    },
    ColorPicker {
        param: ParamId,
    },
    Action(FractalAction),
    /// Start/end/enable editors for every animatable parameter.
    AnimationPanel,
}

impl Control {
    pub fn slider(param: ParamId, min: f64, max: f64) -> Self {
        Control::Slider {
            param,
            min,
            max,
            logarithmic: false,
        }
    }

    pub fn log_slider(param: ParamId, min: f64, max: f64) -> Self {
        Control::Slider {
            param,
            min,
            max,
            logarithmic: true,
        }
    }

    pub fn param(&self) -> Option<ParamId> {
        match self {
            Control::Slider { param, .. }
            | Control::IntSlider { param, .. }
            | Control::Checkbox { param }
            | Control::ColorPicker { param } => Some(*param),
            Control::Action(_) | Control::AnimationPanel => None,
        }
    }
}

pub trait Capability {
    fn register(&self, _store: &mut ParameterStore) -> Result<(), ParamError> {
        Ok(())
    }

    fn controls(&self, out: &mut Vec<Control>);

    fn uniforms(&self, _store: &ParameterStore, _out: &mut UniformSet) -> Result<(), ParamError> {
        Ok(())
    }
}

// ------------------------- Capabilities -------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateCapability;

impl Capability for StateCapability {
    fn controls(&self, out: &mut Vec<Control>) {
        out.push(Control::Action(FractalAction::SaveState));
        out.push(Control::Action(FractalAction::LoadState));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationCapability {
    Plane {
        zoom: f64,
        offset: Point2,
    },
    Orbit {
        zoom: f64,
        h_angle: f64,
        v_angle: f64,
    },
    Fly {
        offset: Point3,
        h_angle: f64,
        v_angle: f64,
        speed: f64,
    },
}

impl NavigationCapability {
    pub fn mode(&self) -> NavigationMode {
        match self {
            NavigationCapability::Plane { .. } => NavigationMode::Plane,
            NavigationCapability::Orbit { .. } => NavigationMode::Orbit,
            NavigationCapability::Fly { .. } => NavigationMode::Fly,
        }
    }
}

impl Capability for NavigationCapability {
    fn register(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        match *self {
            NavigationCapability::Plane { zoom, offset } => {
                store.register(ParamId::ZoomFactor, zoom)?;
                store.register(ParamId::RotationAngle, 0.0)?;
                store.register(ParamId::Offset, offset)?;
                store.register(ParamId::CentralLines, false)?;
            }
            NavigationCapability::Orbit {
                zoom,
                h_angle,
                v_angle,
            } => {
                store.register(ParamId::ZoomFactor, zoom)?;
                store.register(ParamId::HAngle, h_angle)?;
                store.register(ParamId::VAngle, v_angle)?;
            }
            NavigationCapability::Fly {
                offset,
                h_angle,
                v_angle,
                speed,
            } => {
                store.register(ParamId::Offset, offset)?;
                store.register(ParamId::HAngle, h_angle)?;
                store.register(ParamId::VAngle, v_angle)?;
                store.register(ParamId::Speed, speed)?;
            }
        }
        Ok(())
    }

    fn controls(&self, out: &mut Vec<Control>) {
        match self {
            NavigationCapability::Plane { .. } => {
                out.push(Control::slider(ParamId::RotationAngle, -PI, PI));
                out.push(Control::Checkbox {
                    param: ParamId::CentralLines,
                });
                out.push(Control::Action(FractalAction::SavePosition));
                out.push(Control::Action(FractalAction::GoToPosition));
            }
            NavigationCapability::Orbit { .. } => {
                out.push(Control::log_slider(ParamId::ZoomFactor, 0.5, 20.0));
            }
            NavigationCapability::Fly { .. } => {
                out.push(Control::log_slider(ParamId::Speed, 1e-4, 1.0));
                out.push(Control::Action(FractalAction::SavePosition));
                out.push(Control::Action(FractalAction::GoToPosition));
            }
        }
    }

    fn uniforms(&self, store: &ParameterStore, out: &mut UniformSet) -> Result<(), ParamError> {
        match self {
            NavigationCapability::Plane { .. } => {
                let offset = store.point2(ParamId::Offset)?;
                out.push("ZOOM", UniformValue::Double(store.float(ParamId::ZoomFactor)?));
                out.push(
                    "DRAW_LINES",
                    UniformValue::flag(store.flag(ParamId::CentralLines)?),
                );
                out.push(
                    "PHI",
                    UniformValue::Float(store.float(ParamId::RotationAngle)? as f32),
                );
                out.push("OFFSET", UniformValue::DVec2([offset.x, offset.y]));
            }
            NavigationCapability::Orbit { .. } => {
                out.push(
                    "ZOOM",
                    UniformValue::Float(store.float(ParamId::ZoomFactor)? as f32),
                );
                out.push("PHI", UniformValue::Float(store.float(ParamId::HAngle)? as f32));
                out.push("THETA", UniformValue::Float(store.float(ParamId::VAngle)? as f32));
            }
            NavigationCapability::Fly { .. } => {
                let offset = store.point3(ParamId::Offset)?;
                out.push(
                    "OFFSET",
                    UniformValue::Vec3([offset.x as f32, offset.y as f32, offset.z as f32]),
                );
                out.push("PHI", UniformValue::Float(store.float(ParamId::HAngle)? as f32));
                out.push("THETA", UniformValue::Float(store.float(ParamId::VAngle)? as f32));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCapability {
    pub default: Rgba,
}

impl Capability for ColorCapability {
    fn register(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        store.register(ParamId::Color, self.default)
    }

    fn controls(&self, out: &mut Vec<Control>) {
        out.push(Control::ColorPicker {
            param: ParamId::Color,
        });
    }

    fn uniforms(&self, store: &ParameterStore, out: &mut UniformSet) -> Result<(), ParamError> {
        out.push("COLOR", UniformValue::Vec4(store.color(ParamId::Color)?.to_array()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundCapability {
    pub default: Rgba,
}

impl Capability for BackgroundCapability {
    fn register(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        store.register(ParamId::BgColor, self.default)
    }

    fn controls(&self, out: &mut Vec<Control>) {
        out.push(Control::ColorPicker {
            param: ParamId::BgColor,
        });
    }

    fn uniforms(&self, store: &ParameterStore, out: &mut UniformSet) -> Result<(), ParamError> {
        out.push(
            "BG_COLOR",
            UniformValue::Vec4(store.color(ParamId::BgColor)?.to_array()),
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntialiasCapability;

impl Capability for AntialiasCapability {
    fn register(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        store.register(ParamId::Antialiasing, false)
    }

    fn controls(&self, out: &mut Vec<Control>) {
        out.push(Control::Checkbox {
            param: ParamId::Antialiasing,
        });
    }

    fn uniforms(&self, store: &ParameterStore, out: &mut UniformSet) -> Result<(), ParamError> {
        let samples = if store.flag(ParamId::Antialiasing)? { 2 } else { 1 };
        out.push("AA", UniformValue::Int(samples));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationCapability {
    pub default: i64,
    pub max: i64,
}

impl Capability for IterationCapability {
    fn register(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        store.register(ParamId::MaxIter, self.default)
    }

    fn controls(&self, out: &mut Vec<Control>) {
        out.push(Control::IntSlider {
            param: ParamId::MaxIter,
            min: 0,
            max: self.max,
        });
    }

    fn uniforms(&self, store: &ParameterStore, out: &mut UniformSet) -> Result<(), ParamError> {
        let iterations = store.int(ParamId::MaxIter)?.clamp(0, i32::MAX as i64) as i32;
        out.push("MAX_ITER", UniformValue::Int(iterations));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenshotCapability;

impl Capability for ScreenshotCapability {
    fn register(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        store.register(ParamId::HighScreenshotQuality, false)
    }

    fn controls(&self, out: &mut Vec<Control>) {
        out.push(Control::Checkbox {
            param: ParamId::HighScreenshotQuality,
        });
        out.push(Control::Action(FractalAction::Screenshot));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationCapability {
    pub specs: Vec<AnimationSpec>,
}

impl Capability for AnimationCapability {
    fn controls(&self, out: &mut Vec<Control>) {
        out.push(Control::AnimationPanel);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub stateful: Option<StateCapability>,
    pub navigation: NavigationCapability,
    pub color: Option<ColorCapability>,
    pub background: Option<BackgroundCapability>,
    pub antialias: Option<AntialiasCapability>,
    pub iteration: Option<IterationCapability>,
    pub screenshot: Option<ScreenshotCapability>,
    pub animation: Option<AnimationCapability>,
}

impl Capabilities {
    pub fn new(navigation: NavigationCapability) -> Self {
        Self {
            stateful: None,
            navigation,
            color: None,
            background: None,
            antialias: None,
            iteration: None,
            screenshot: None,
            animation: None,
        }
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful.is_some()
    }

    fn ordered<'a>(&'a self, extras: &'a dyn Capability) -> Vec<&'a dyn Capability> {
        let mut list: Vec<&dyn Capability> = Vec::with_capacity(9);
        if let Some(c) = &self.stateful {
            list.push(c);
        }
        list.push(&self.navigation);
        if let Some(c) = &self.color {
            list.push(c);
        }
        if let Some(c) = &self.background {
            list.push(c);
        }
        if let Some(c) = &self.antialias {
            list.push(c);
        }
        if let Some(c) = &self.iteration {
            list.push(c);
        }
        if let Some(c) = &self.screenshot {
            list.push(c);
        }
        list.push(extras);
        if let Some(c) = &self.animation {
            list.push(c);
        }
        list
    }

    pub fn register(
        &self,
        store: &mut ParameterStore,
        extras: &dyn Capability,
    ) -> Result<(), ParamError> {
        self.ordered(extras)
            .into_iter()
            .try_for_each(|c| c.register(store))
    }

    pub fn controls(&self, extras: &dyn Capability) -> Vec<Control> {
        let mut out = Vec::new();
        for c in self.ordered(extras) {
            c.controls(&mut out);
        }
        out
    }

    pub fn uniforms(
        &self,
        store: &ParameterStore,
        extras: &dyn Capability,
        out: &mut UniformSet,
    ) -> Result<(), ParamError> {
        self.ordered(extras)
            .into_iter()
            .try_for_each(|c| c.uniforms(store, out))
    }
}
