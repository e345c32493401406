//! Concrete fractal kinds and the per-instance bundle of parameters,
//! capabilities and animation state.

use std::f64::consts::{PI, TAU};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::animation::{AnimationEngine, AnimationSpec, CancelToken, RecordError};
use crate::capability::{
    AnimationCapability, AntialiasCapability, BackgroundCapability, Capabilities, Capability,
    ColorCapability, Control, IterationCapability, NavigationCapability, ScreenshotCapability,
    StateCapability,
};
use crate::navigation::NavigationMode;
use crate::params::{ParamError, ParamId, ParameterStore, Point2, Point3, Rgba};
use crate::uniforms::{reference_orbit, UniformSet, UniformValue, MAX_ORBIT_LEN};

const DARK_GREY: Rgba = Rgba::new(0.1765, 0.1765, 0.1765, 1.0);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FractalKind {
    Mandelbrot2D,
    Julia2D,
    BurningShip2D,
    Mandelbrot3D,
    Julia3D,
    Mandelbrot4D,
    Julia4D,
    Mandelbox,
}

impl FractalKind {
    pub const ALL: [FractalKind; 8] = [
        FractalKind::Mandelbrot2D,
        FractalKind::Julia2D,
        FractalKind::BurningShip2D,
        FractalKind::Mandelbrot3D,
        FractalKind::Julia3D,
        FractalKind::Mandelbrot4D,
        FractalKind::Julia4D,
        FractalKind::Mandelbox,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FractalKind::Mandelbrot2D => "Mandelbrot 2D",
            FractalKind::Julia2D => "Julia 2D",
            FractalKind::BurningShip2D => "Burning Ship 2D",
            FractalKind::Mandelbrot3D => "Mandelbrot 3D",
            FractalKind::Julia3D => "Julia 3D",
            FractalKind::Mandelbrot4D => "Mandelbrot 4D",
            FractalKind::Julia4D => "Julia 4D",
            FractalKind::Mandelbox => "Mandelbox",
        }
    }

    pub fn shader_file(&self) -> &'static str {
        match self {
            FractalKind::Mandelbrot2D => "mandelbrot_2d.wgsl",
            FractalKind::Julia2D => "julia_2d.wgsl",
            FractalKind::BurningShip2D => "burning_ship_2d.wgsl",
            FractalKind::Mandelbrot3D => "mandelbrot_3d.wgsl",
            FractalKind::Julia3D => "julia_3d.wgsl",
            FractalKind::Mandelbrot4D => "mandelbrot_4d.wgsl",
            FractalKind::Julia4D => "julia_4d.wgsl",
            FractalKind::Mandelbox => "mandelbox.wgsl",
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            FractalKind::Mandelbrot2D | FractalKind::Julia2D | FractalKind::BurningShip2D
        )
    }

    pub fn capabilities(&self) -> Capabilities {
        let plane = NavigationCapability::Plane {
            zoom: 1.0,
            offset: Point2::ZERO,
        };
        let zoom_and_turn = |zoom: f64| {
            vec![
                AnimationSpec::multiplicative(ParamId::ZoomFactor, zoom, zoom),
                AnimationSpec::additive(ParamId::RotationAngle, 0.0, 0.0),
            ]
        };
        match self {
            FractalKind::Mandelbrot2D | FractalKind::BurningShip2D => {
                let mut caps = Capabilities::new(plane);
                if *self == FractalKind::Mandelbrot2D {
                    caps.stateful = Some(StateCapability);
                }
                caps.color = Some(ColorCapability {
                    default: Rgba::WHITE,
                });
                caps.antialias = Some(AntialiasCapability);
                caps.iteration = Some(IterationCapability {
                    default: 100,
                    max: 500,
                });
                caps.screenshot = Some(ScreenshotCapability);
                caps.animation = Some(AnimationCapability {
                    specs: zoom_and_turn(1.0),
                });
                caps
            }
            FractalKind::Julia2D => {
                let mut caps = Capabilities::new(plane);
                caps.stateful = Some(StateCapability);
                caps.color = Some(ColorCapability {
                    default: Rgba::WHITE,
                });
                caps.antialias = Some(AntialiasCapability);
                caps.iteration = Some(IterationCapability {
                    default: 100,
                    max: 500,
                });
                caps.screenshot = Some(ScreenshotCapability);
                caps.animation = Some(AnimationCapability {
                    specs: vec![
                        AnimationSpec::additive(ParamId::ArgC, 0.1, 0.1),
                        AnimationSpec::additive(ParamId::AbsC, 0.1, 0.1),
                        AnimationSpec::multiplicative(ParamId::ZoomFactor, 1.0, 1.0),
                    ],
                });
                caps
            }
            FractalKind::Mandelbrot3D | FractalKind::Mandelbrot4D => {
                let (zoom, h, v, iterations, background) = if *self == FractalKind::Mandelbrot3D {
                    (2.8, 4.4, -0.5, 10, Rgba::BLACK)
                } else {
                    (3.0, -0.8, -0.2, 21, DARK_GREY)
                };
                let mut caps = Capabilities::new(NavigationCapability::Orbit {
                    zoom,
                    h_angle: h,
                    v_angle: v,
                });
                caps.color = Some(ColorCapability {
                    default: Rgba::new(0.439, 0.1765, 0.1765, 1.0),
                });
                caps.background = Some(BackgroundCapability {
                    default: background,
                });
                caps.antialias = Some(AntialiasCapability);
                caps.iteration = Some(IterationCapability {
                    default: iterations,
                    max: 30,
                });
                caps.screenshot = Some(ScreenshotCapability);
                caps.animation = Some(AnimationCapability {
                    specs: vec![
                        AnimationSpec::additive(ParamId::HAngle, h, h),
                        AnimationSpec::additive(ParamId::VAngle, v, v),
                    ],
                });
                caps
            }
            FractalKind::Julia3D | FractalKind::Julia4D => {
                let (zoom, h, v, iterations) = if *self == FractalKind::Julia3D {
                    (2.8, 0.0, -0.3, 7)
                } else {
                    (2.8, -0.3, -0.3, 14)
                };
                let j = JuliaDefaults::for_kind(*self);
                let mut caps = Capabilities::new(NavigationCapability::Orbit {
                    zoom,
                    h_angle: h,
                    v_angle: v,
                });
                caps.stateful = Some(StateCapability);
                caps.color = Some(ColorCapability {
                    default: Rgba::WHITE,
                });
                caps.background = Some(BackgroundCapability { default: DARK_GREY });
                caps.antialias = Some(AntialiasCapability);
                caps.iteration = Some(IterationCapability {
                    default: iterations,
                    max: 30,
                });
                caps.screenshot = Some(ScreenshotCapability);
                caps.animation = Some(AnimationCapability {
                    specs: vec![
                        AnimationSpec::additive(ParamId::HAngle, h, h),
                        AnimationSpec::additive(ParamId::VAngle, v, v),
                        AnimationSpec::additive(ParamId::AbsC, j.abs_c, j.abs_c),
                        AnimationSpec::additive(ParamId::ArgxC, j.argx_c, j.argx_c),
                        AnimationSpec::additive(ParamId::ArgyC, j.argy_c, j.argy_c),
                    ],
                });
                caps
            }
            FractalKind::Mandelbox => {
                let mut caps = Capabilities::new(NavigationCapability::Fly {
                    offset: Point3::new(0.0, 0.0, 50.0),
                    h_angle: 0.0,
                    v_angle: 0.0,
                    speed: 0.1,
                });
                caps.color = Some(ColorCapability {
                    default: Rgba::WHITE,
                });
                caps.background = Some(BackgroundCapability { default: DARK_GREY });
                caps.antialias = Some(AntialiasCapability);
                caps.iteration = Some(IterationCapability {
                    default: 20,
                    max: 30,
                });
                caps.screenshot = Some(ScreenshotCapability);
                caps.animation = Some(AnimationCapability {
                    specs: vec![
                        AnimationSpec::additive(ParamId::OutRad, 5.0, 5.0),
                        AnimationSpec::additive(ParamId::InRad, 3.238, 3.238),
                        AnimationSpec::additive(ParamId::Folding, 4.245, 4.245),
                        AnimationSpec::additive(ParamId::Scale, 2.051, 2.051),
                    ],
                });
                caps
            }
        }
    }
}

struct JuliaDefaults {
    abs_c: f64,
    argx_c: f64,
    argy_c: f64,
    power: f64,
    ao: f64,
}

impl JuliaDefaults {
    fn for_kind(kind: FractalKind) -> Self {
        match kind {
            FractalKind::Julia4D => Self {
                abs_c: 0.7626,
                argx_c: 3.3,
                argy_c: 6.28,
                power: 2.0,
                ao: 250.0,
            },
            _ => Self {
                abs_c: 0.8776,
                argx_c: 2.0,
                argy_c: 2.67,
                power: 7.0,
                ao: 120.0,
            },
        }
    }
}

/// Julia constant on the 3-sphere of radius `abs_c`.
pub fn julia_c3(abs_c: f64, argx_c: f64, argy_c: f64) -> Point3 {
    let (sin_a, cos_a) = argx_c.sin_cos();
    let (sin_b, cos_b) = argy_c.sin_cos();
    Point3::new(abs_c * cos_a * cos_b, abs_c * sin_a * cos_b, abs_c * sin_b)
}

// ------------------------- Kind-specific parameters -------------------------

/// Parameters, controls and uniforms that belong to one kind only.
pub struct KindExtras(pub FractalKind);

impl KindExtras {
    fn volume(store: &mut ParameterStore, power: f64, ao: f64) -> Result<(), ParamError> {
        store.register(ParamId::Power, power)?;
        store.register(ParamId::RotateY, 0.0)?;
        store.register(ParamId::Cut, false)?;
        store.register(ParamId::Shadows, true)?;
        store.register(ParamId::Depth, 400i64)?;
        store.register(ParamId::Ao, ao)
    }

    fn volume_controls(out: &mut Vec<Control>) {
        out.push(Control::slider(ParamId::Power, 2.0, 10.0));
        out.push(Control::slider(ParamId::RotateY, 0.0, TAU));
        out.push(Control::Checkbox {
            param: ParamId::Cut,
        });
        out.push(Control::Checkbox {
            param: ParamId::Shadows,
        });
        out.push(Control::IntSlider {
            param: ParamId::Depth,
            min: 1,
            max: 400,
        });
        out.push(Control::slider(ParamId::Ao, 100.0, 500.0));
    }

    fn volume_uniforms(store: &ParameterStore, out: &mut UniformSet) -> Result<(), ParamError> {
        out.push("POWER", UniformValue::Float(store.float(ParamId::Power)? as f32));
        out.push(
            "ROTATE_Y",
            UniformValue::Float(store.float(ParamId::RotateY)? as f32),
        );
        out.push("CUT", UniformValue::flag(store.flag(ParamId::Cut)?));
        out.push("SHADOWS", UniformValue::flag(store.flag(ParamId::Shadows)?));
        out.push("MAX_STEPS", UniformValue::Int(store.int(ParamId::Depth)? as i32));
        out.push("AO_COEF", UniformValue::Float(store.float(ParamId::Ao)? as f32));
        Ok(())
    }

    fn julia_c_controls(out: &mut Vec<Control>) {
        out.push(Control::slider(ParamId::AbsC, 0.0, 10.0));
        out.push(Control::slider(ParamId::ArgxC, 0.0, TAU));
        out.push(Control::slider(ParamId::ArgyC, 0.0, TAU));
    }
}

impl Capability for KindExtras {
    fn register(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        match self.0 {
            FractalKind::Mandelbrot2D => {
                store.register(ParamId::Power, 2.0)?;
                store.register(ParamId::Perturbation, false)?;
            }
            FractalKind::Julia2D => {
                store.register(ParamId::ArgC, PI)?;
                store.register(ParamId::AbsC, 0.7)?;
                store.register(ParamId::Power, 2.0)?;
            }
            FractalKind::BurningShip2D => {
                store.register(ParamId::Power, 2.0)?;
            }
            FractalKind::Mandelbrot3D => Self::volume(store, 9.0, 150.0)?,
            FractalKind::Mandelbrot4D => Self::volume(store, 2.0, 250.0)?,
            FractalKind::Julia3D | FractalKind::Julia4D => {
                let j = JuliaDefaults::for_kind(self.0);
                store.register(ParamId::AbsC, j.abs_c)?;
                store.register(ParamId::ArgxC, j.argx_c)?;
                store.register(ParamId::ArgyC, j.argy_c)?;
                Self::volume(store, j.power, j.ao)?;
            }
            FractalKind::Mandelbox => {
                store.register(ParamId::Depth, 300i64)?;
                store.register(ParamId::Ao, 250.0)?;
                store.register(ParamId::Folding, 4.245)?;
                store.register(ParamId::Scale, 2.051)?;
                store.register(ParamId::OutRad, 5.0)?;
                store.register(ParamId::InRad, 3.238)?;
                store.register(ParamId::Shadows, false)?;
            }
        }
        Ok(())
    }

    fn controls(&self, out: &mut Vec<Control>) {
        match self.0 {
            FractalKind::Mandelbrot2D => {
                out.push(Control::slider(ParamId::Power, 2.0, 10.0));
                out.push(Control::Checkbox {
                    param: ParamId::Perturbation,
                });
            }
            FractalKind::Julia2D => {
                out.push(Control::slider(ParamId::ArgC, 0.0, TAU));
                out.push(Control::slider(ParamId::AbsC, 0.0, 2.0));
                out.push(Control::slider(ParamId::Power, 2.0, 10.0));
            }
            FractalKind::BurningShip2D => {
                out.push(Control::slider(ParamId::Power, 2.0, 10.0));
            }
            FractalKind::Mandelbrot3D | FractalKind::Mandelbrot4D => {
                Self::volume_controls(out);
            }
            FractalKind::Julia3D | FractalKind::Julia4D => {
                Self::julia_c_controls(out);
                Self::volume_controls(out);
            }
            FractalKind::Mandelbox => {
                out.push(Control::IntSlider {
                    param: ParamId::Depth,
                    min: 1,
                    max: 400,
                });
                out.push(Control::slider(ParamId::Ao, 100.0, 500.0));
                out.push(Control::slider(ParamId::Folding, 0.001, 5.0));
                out.push(Control::slider(ParamId::Scale, 0.001, 5.0));
                out.push(Control::slider(ParamId::OutRad, 0.001, 5.0));
                out.push(Control::slider(ParamId::InRad, 0.001, 5.0));
                out.push(Control::Checkbox {
                    param: ParamId::Shadows,
                });
            }
        }
    }

    fn uniforms(&self, store: &ParameterStore, out: &mut UniformSet) -> Result<(), ParamError> {
        match self.0 {
            FractalKind::Mandelbrot2D => {
                let perturbation = store.flag(ParamId::Perturbation)?;
                out.push("POWER", UniformValue::Float(store.float(ParamId::Power)? as f32));
                out.push("PERTURBATION", UniformValue::flag(perturbation));
                if perturbation {
                    let max_iter =
                        store.int(ParamId::MaxIter)?.clamp(0, MAX_ORBIT_LEN as i64) as usize;
                    out.set_reference_orbit(reference_orbit(
                        store.point2(ParamId::Offset)?,
                        max_iter,
                    ));
                }
            }
            FractalKind::Julia2D => {
                let (sin, cos) = store.float(ParamId::ArgC)?.sin_cos();
                let abs = store.float(ParamId::AbsC)?;
                out.push("POWER", UniformValue::Float(store.float(ParamId::Power)? as f32));
                out.push("C", UniformValue::DVec2([abs * cos, abs * sin]));
            }
            FractalKind::BurningShip2D => {
                out.push("POWER", UniformValue::Float(store.float(ParamId::Power)? as f32));
            }
            FractalKind::Mandelbrot3D | FractalKind::Mandelbrot4D => {
                Self::volume_uniforms(store, out)?;
            }
            FractalKind::Julia3D | FractalKind::Julia4D => {
                let c = julia_c3(
                    store.float(ParamId::AbsC)?,
                    store.float(ParamId::ArgxC)?,
                    store.float(ParamId::ArgyC)?,
                );
                out.push("C", UniformValue::Vec3([c.x as f32, c.y as f32, c.z as f32]));
                Self::volume_uniforms(store, out)?;
            }
            FractalKind::Mandelbox => {
                out.push("MAX_STEPS", UniformValue::Int(store.int(ParamId::Depth)? as i32));
                out.push("AO_COEF", UniformValue::Float(store.float(ParamId::Ao)? as f32));
                out.push(
                    "FOLDING",
                    UniformValue::Float(store.float(ParamId::Folding)? as f32),
                );
                out.push("SCALE", UniformValue::Float(store.float(ParamId::Scale)? as f32));
                out.push(
                    "OUT_RAD",
                    UniformValue::Float(store.float(ParamId::OutRad)? as f32),
                );
                out.push("IN_RAD", UniformValue::Float(store.float(ParamId::InRad)? as f32));
                out.push("SHADOWS", UniformValue::flag(store.flag(ParamId::Shadows)?));
            }
        }
        Ok(())
    }
}

// ------------------------- Instance -------------------------

#[derive(Debug, Clone)]
pub struct FractalInstance {
    name: String,
    kind: FractalKind,
    shader_path: PathBuf,
    capabilities: Capabilities,
    store: ParameterStore,
    animation: Option<AnimationEngine>,
}

impl FractalInstance {
    pub fn new(kind: FractalKind, shader_dir: &Path) -> Result<Self, ParamError> {
        Self::with_name(kind.label(), kind, shader_dir)
    }

    pub fn with_name(
        name: impl Into<String>,
        kind: FractalKind,
        shader_dir: &Path,
    ) -> Result<Self, ParamError> {
        let capabilities = kind.capabilities();
        let mut store = ParameterStore::new();
        capabilities.register(&mut store, &KindExtras(kind))?;
        let animation = capabilities
            .animation
            .as_ref()
            .map(|a| AnimationEngine::new(a.specs.clone()));
        store.take_redraw();
        let name = name.into();
        debug!(%name, params = store.len(), "fractal instance created");
        Ok(Self {
            name,
            kind,
            shader_path: shader_dir.join(kind.shader_file()),
            capabilities,
            store,
            animation,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FractalKind {
        self.kind
    }

    pub fn shader_path(&self) -> &Path {
        &self.shader_path
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn navigation_mode(&self) -> NavigationMode {
        self.capabilities.navigation.mode()
    }

    pub fn is_stateful(&self) -> bool {
        self.capabilities.is_stateful()
    }

    pub fn params(&self) -> &ParameterStore {
        &self.store
    }

    pub fn params_mut(&mut self) -> &mut ParameterStore {
        &mut self.store
    }

    pub fn animation(&self) -> Option<&AnimationEngine> {
        self.animation.as_ref()
    }

    pub fn animation_mut(&mut self) -> Option<&mut AnimationEngine> {
        self.animation.as_mut()
    }

    pub fn controls(&self) -> Vec<Control> {
        self.capabilities.controls(&KindExtras(self.kind))
    }

    /// Inclusive bounds of an integer parameter, taken from its slider.
    pub fn int_range(&self, id: ParamId) -> Option<(i64, i64)> {
        self.controls().into_iter().find_map(|control| match control {
            Control::IntSlider { param, min, max } if param == id => Some((min, max)),
            _ => None,
        })
    }

    pub fn uniforms(&self, resolution: (u32, u32)) -> Result<UniformSet, ParamError> {
        build_uniforms(self.kind, &self.capabilities, &self.store, resolution)
    }

    /// Names of the uniforms this kind sends, in upload order.
    pub fn uniform_layout(&self) -> Result<Vec<&'static str>, ParamError> {
        Ok(self.uniforms((1, 1))?.names())
    }

    pub fn show_animation_start(&mut self) -> Result<(), ParamError> {
        match &self.animation {
            Some(engine) => engine.show_start(&mut self.store),
            None => Ok(()),
        }
    }

    pub fn show_animation_end(&mut self) -> Result<(), ParamError> {
        match &self.animation {
            Some(engine) => engine.show_end(&mut self.store),
            None => Ok(()),
        }
    }

    pub fn preview_tick(&mut self) -> Result<bool, ParamError> {
        match &self.animation {
            Some(engine) => engine.preview_tick(&mut self.store),
            None => Ok(false),
        }
    }

    /// Runs a deterministic recording, handing each frame's uniforms to
    /// `capture`.
    pub fn record<T>(
        &mut self,
        resolution: (u32, u32),
        cancel: &dyn CancelToken,
        mut capture: impl FnMut(usize, &UniformSet) -> Result<T, RecordError>,
    ) -> Result<Vec<T>, RecordError> {
        let kind = self.kind;
        let capabilities = &self.capabilities;
        let engine = self
            .animation
            .as_mut()
            .ok_or_else(|| RecordError::NotAnimatable(self.name.clone()))?;
        engine.record(&mut self.store, cancel, |index, store| {
            let uniforms = build_uniforms(kind, capabilities, store, resolution)?;
            capture(index, &uniforms)
        })
    }
}

fn build_uniforms(
    kind: FractalKind,
    capabilities: &Capabilities,
    store: &ParameterStore,
    resolution: (u32, u32),
) -> Result<UniformSet, ParamError> {
    let mut set = UniformSet::new();
    set.push(
        "RES",
        UniformValue::Vec2([resolution.0 as f32, resolution.1 as f32]),
    );
    capabilities.uniforms(store, &KindExtras(kind), &mut set)?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::NeverCancel;

    fn instance(kind: FractalKind) -> FractalInstance {
        FractalInstance::new(kind, Path::new("shaders")).unwrap()
    }

    #[test]
    fn every_kind_builds_with_unique_parameters() {
        for kind in FractalKind::ALL {
            let fractal = instance(kind);
            assert!(!fractal.params().is_empty());
            assert!(fractal.uniforms((64, 48)).is_ok(), "{kind:?}");
            assert_eq!(
                fractal.shader_path(),
                Path::new("shaders").join(kind.shader_file())
            );
        }
    }

    #[test]
    fn navigation_modes_match_kinds() {
        assert_eq!(
            instance(FractalKind::Julia2D).navigation_mode(),
            NavigationMode::Plane
        );
        assert_eq!(
            instance(FractalKind::Julia4D).navigation_mode(),
            NavigationMode::Orbit
        );
        assert_eq!(
            instance(FractalKind::Mandelbox).navigation_mode(),
            NavigationMode::Fly
        );
    }

    #[test]
    fn julia_2d_defaults() {
        let fractal = instance(FractalKind::Julia2D);
        assert_eq!(fractal.params().float(ParamId::ArgC).unwrap(), PI);
        assert_eq!(fractal.params().float(ParamId::AbsC).unwrap(), 0.7);
        let uniforms = fractal.uniforms((100, 100)).unwrap();
        match uniforms.get("C") {
            Some(UniformValue::DVec2([x, y])) => {
                assert!((x + 0.7).abs() < 1e-12);
                assert!(y.abs() < 1e-12);
            }
            other => panic!("unexpected C uniform {other:?}"),
        }
    }

    #[test]
    fn julia_3d_constant_is_spherical() {
        let c = julia_c3(0.8776, 2.0, 2.67);
        assert!((c.length() - 0.8776).abs() < 1e-12);
    }

    #[test]
    fn uniforms_start_with_resolution() {
        let fractal = instance(FractalKind::Mandelbox);
        let names = fractal.uniforms((640, 360)).unwrap().names();
        assert_eq!(names[0], "RES");
        assert_eq!(&names[1..4], &["OFFSET", "PHI", "THETA"]);
        assert!(names.contains(&"FOLDING"));
    }

    #[test]
    fn perturbation_attaches_reference_orbit() {
        let mut fractal = instance(FractalKind::Mandelbrot2D);
        assert!(fractal.uniforms((8, 8)).unwrap().reference_orbit().is_none());
        fractal
            .params_mut()
            .set(ParamId::Perturbation, true)
            .unwrap();
        fractal.params_mut().set(ParamId::MaxIter, 64i64).unwrap();
        let uniforms = fractal.uniforms((8, 8)).unwrap();
        assert_eq!(uniforms.reference_orbit().map(|o| o.len()), Some(64));
        assert_eq!(uniforms.get("PERTURBATION"), Some(UniformValue::Int(1)));
    }

    #[test]
    fn huge_iteration_count_keeps_the_orbit_bounded() {
        let mut fractal = instance(FractalKind::Mandelbrot2D);
        let store = fractal.params_mut();
        store.set(ParamId::Perturbation, true).unwrap();
        store.set(ParamId::MaxIter, 1i64 << 40).unwrap();
        let uniforms = fractal.uniforms((8, 8)).unwrap();
        assert_eq!(
            uniforms.reference_orbit().map(|o| o.len()),
            Some(MAX_ORBIT_LEN)
        );
        assert_eq!(fractal.int_range(ParamId::MaxIter), Some((0, 500)));
        assert_eq!(fractal.int_range(ParamId::Power), None);
    }

    #[test]
    fn record_passes_uniforms_per_frame() {
        let mut fractal = instance(FractalKind::Julia2D);
        {
            let engine = fractal.animation_mut().unwrap();
            engine.set_duration(0.1);
            let spec = engine.spec_mut(ParamId::ArgC).unwrap();
            spec.enabled = true;
            spec.start = 0.0;
            spec.end = PI / 2.0;
        }
        let cs = fractal
            .record((32, 32), &NeverCancel, |_, u| Ok(u.get("C")))
            .unwrap();
        assert_eq!(cs.len(), 7);
        assert_eq!(cs[0], Some(UniformValue::DVec2([0.7, 0.0])));
        match cs[6] {
            Some(UniformValue::DVec2([x, y])) => {
                assert!(x.abs() < 1e-9);
                assert!((y - 0.7).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_animatable_recording_is_refused() {
        let mut fractal = instance(FractalKind::Mandelbrot2D);
        fractal.animation = None;
        let err = fractal
            .record((8, 8), &NeverCancel, |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, RecordError::NotAnimatable(_)));
    }

    #[test]
    fn controls_end_with_animation_panel() {
        for kind in FractalKind::ALL {
            let controls = instance(kind).controls();
            assert_eq!(controls.last(), Some(&Control::AnimationPanel));
        }
    }
}
