//! CPU reference renderer. Escape-time iteration for the plane kinds and
//! distance-estimated ray marching for the volumetric ones, parallelised
//! over rows with rayon.

use image::RgbaImage;
use rayon::prelude::*;

use super::{RenderBackend, RenderError, Renderer, ShaderCompileError};
use crate::coords::{ViewTransform, WidgetSize};
use crate::fractal::{FractalInstance, FractalKind};
use crate::navigation::FlyBasis;
use crate::params::{Point2, Point3};
use crate::uniforms::{UniformSet, UniformValue, ORBIT_ESCAPE_SQ};

const BAILOUT_SQ: f64 = 256.0;
const HIT_EPSILON: f64 = 1e-4;
const ORBIT_FOCAL: f64 = 1.5;
const FLY_FOCAL: f64 = 1.0;
const FLY_FAR: f64 = 200.0;

#[derive(Debug, Default)]
pub struct CpuRenderer;

impl CpuRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for CpuRenderer {
    fn backend(&self) -> RenderBackend {
        RenderBackend::Cpu
    }

    // Kernels are compiled in; there is nothing to load.
    fn prepare(&mut self, _fractal: &FractalInstance) -> Result<(), ShaderCompileError> {
        Ok(())
    }

    fn draw(
        &mut self,
        kind: FractalKind,
        uniforms: &UniformSet,
        size: (u32, u32),
    ) -> Result<RgbaImage, RenderError> {
        if size.0 == 0 || size.1 == 0 {
            return Err(RenderError::EmptyTarget);
        }
        let u = Uniforms(uniforms);
        if kind.is_planar() {
            let scene = PlaneScene::new(kind, &u)?;
            Ok(shade(size, u.samples(), |p| scene.sample(p, size)))
        } else {
            let scene = VolumeScene::new(kind, &u, size)?;
            Ok(shade(size, u.samples(), |p| scene.sample(p)))
        }
    }
}

// ------------------------- Uniform access -------------------------

struct Uniforms<'a>(&'a UniformSet);

impl Uniforms<'_> {
    fn float(&self, name: &'static str) -> Result<f64, RenderError> {
        self.0
            .get(name)
            .and_then(|v| v.as_f64())
            .ok_or(RenderError::Uniform(name))
    }

    fn int(&self, name: &'static str) -> Result<i64, RenderError> {
        match self.0.get(name) {
            Some(UniformValue::Int(v)) => Ok(v as i64),
            _ => Err(RenderError::Uniform(name)),
        }
    }

    fn flag(&self, name: &'static str) -> bool {
        matches!(self.0.get(name), Some(UniformValue::Int(v)) if v != 0)
    }

    fn point2(&self, name: &'static str) -> Result<Point2, RenderError> {
        match self.0.get(name) {
            Some(UniformValue::DVec2([x, y])) => Ok(Point2::new(x, y)),
            Some(UniformValue::Vec2([x, y])) => Ok(Point2::new(x as f64, y as f64)),
            _ => Err(RenderError::Uniform(name)),
        }
    }

    fn point3(&self, name: &'static str) -> Result<Point3, RenderError> {
        match self.0.get(name) {
            Some(UniformValue::Vec3([x, y, z])) => Ok(Point3::new(x as f64, y as f64, z as f64)),
            _ => Err(RenderError::Uniform(name)),
        }
    }

    fn color(&self, name: &'static str) -> Result<[f64; 4], RenderError> {
        match self.0.get(name) {
            Some(UniformValue::Vec4(c)) => Ok(c.map(|v| v as f64)),
            _ => Err(RenderError::Uniform(name)),
        }
    }

    fn samples(&self) -> u32 {
        self.int("AA").map(|v| v.clamp(1, 4) as u32).unwrap_or(1)
    }
}

/// Supersamples every pixel `samples²` times and averages the results.
fn shade<F>(size: (u32, u32), samples: u32, sample: F) -> RgbaImage
where
    F: Fn(Point2) -> [f64; 4] + Sync,
{
    let (width, height) = size;
    let row_bytes = width as usize * 4;
    let mut pixels = vec![0u8; row_bytes * height as usize];
    let n = samples as f64;
    pixels
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let mut acc = [0.0f64; 4];
                for sy in 0..samples {
                    for sx in 0..samples {
                        let p = Point2::new(
                            x as f64 + (sx as f64 + 0.5) / n,
                            y as f64 + (sy as f64 + 0.5) / n,
                        );
                        let c = sample(p);
                        for (a, v) in acc.iter_mut().zip(c) {
                            *a += v;
                        }
                    }
                }
                for (out, a) in px.iter_mut().zip(acc) {
                    *out = ((a / (n * n)).clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            }
        });
    // Length always matches width * height * 4.
    RgbaImage::from_raw(width, height, pixels).unwrap_or_else(|| RgbaImage::new(width, height))
}

// ------------------------- Plane fractals -------------------------

struct PlaneScene {
    kind: FractalKind,
    view: ViewTransform,
    max_iter: u32,
    power: f64,
    julia_c: Point2,
    color: [f64; 4],
    draw_lines: bool,
    orbit: Option<Vec<Point2>>,
}

impl PlaneScene {
    fn new(kind: FractalKind, u: &Uniforms) -> Result<Self, RenderError> {
        let julia_c = if kind == FractalKind::Julia2D {
            u.point2("C")?
        } else {
            Point2::ZERO
        };
        let orbit = if u.flag("PERTURBATION") {
            u.0.reference_orbit().map(|orbit| {
                let escape = orbit
                    .iter()
                    .position(|[x, y]| x * x + y * y >= ORBIT_ESCAPE_SQ)
                    .map_or(orbit.len(), |i| i + 1);
                orbit[..escape]
                    .iter()
                    .map(|&[x, y]| Point2::new(x, y))
                    .collect()
            })
        } else {
            None
        };
        Ok(Self {
            kind,
            view: ViewTransform::new(u.float("ZOOM")?, u.float("PHI")?, u.point2("OFFSET")?),
            max_iter: u.int("MAX_ITER")?.max(0) as u32,
            power: u.float("POWER")?,
            julia_c,
            color: u.color("COLOR")?,
            draw_lines: u.flag("DRAW_LINES"),
            orbit,
        })
    }

    fn sample(&self, pixel: Point2, size: (u32, u32)) -> [f64; 4] {
        let widget = WidgetSize::from(size);
        if self.draw_lines {
            let (cx, cy) = ((size.0 / 2) as f64, (size.1 / 2) as f64);
            if pixel.x.floor() == cx || pixel.y.floor() == cy {
                return [1.0, 1.0, 1.0, 1.0];
            }
        }
        let point = self
            .view
            .widget_to_fractal(pixel, widget)
            .unwrap_or(self.view.offset);
        let escaped = match (self.kind, &self.orbit) {
            (FractalKind::Mandelbrot2D, Some(orbit)) if self.power == 2.0 => {
                escape_perturbed(orbit, point - self.view.offset, point, self.max_iter)
            }
            (FractalKind::Julia2D, _) => {
                escape_time(self.kind, point, self.julia_c, self.power, self.max_iter, 0)
            }
            _ => escape_time(self.kind, Point2::ZERO, point, self.power, self.max_iter, 0),
        };
        match escaped {
            None => [0.0, 0.0, 0.0, self.color[3]],
            Some(mu) => {
                let t = (mu / self.max_iter.max(1) as f64).clamp(0.0, 1.0).sqrt();
                [self.color[0] * t, self.color[1] * t, self.color[2] * t, self.color[3]]
            }
        }
    }
}

fn plane_step(kind: FractalKind, z: Point2, c: Point2, power: f64) -> Point2 {
    let z = if kind == FractalKind::BurningShip2D {
        Point2::new(z.x.abs(), z.y.abs())
    } else {
        z
    };
    if power == 2.0 {
        Point2::new(z.x * z.x - z.y * z.y + c.x, 2.0 * z.x * z.y + c.y)
    } else {
        let r = z.length().powf(power);
        let theta = z.y.atan2(z.x) * power;
        Point2::new(r * theta.cos() + c.x, r * theta.sin() + c.y)
    }
}

fn smooth_count(iteration: u32, z: Point2, power: f64) -> f64 {
    let log_r = z.length().max(1.0 + 1e-9).ln();
    iteration as f64 + 1.0 - log_r.ln().max(0.0) / power.max(1.0 + 1e-9).ln()
}

/// Smooth escape iteration, `None` when the point never escapes.
fn escape_time(
    kind: FractalKind,
    z0: Point2,
    c: Point2,
    power: f64,
    max_iter: u32,
    start: u32,
) -> Option<f64> {
    let mut z = z0;
    for i in start..max_iter {
        if z.x * z.x + z.y * z.y > BAILOUT_SQ {
            return Some(smooth_count(i, z, power));
        }
        z = plane_step(kind, z, c, power);
    }
    None
}

/// Iterates the offset from a high-precision reference orbit. Falls back to
/// direct iteration once the reference escapes or the delta outgrows it.
fn escape_perturbed(orbit: &[Point2], dc: Point2, c: Point2, max_iter: u32) -> Option<f64> {
    let mut reference = Point2::ZERO;
    let mut dz = Point2::ZERO;
    for i in 0..max_iter {
        let z = reference + dz;
        let z2 = z.x * z.x + z.y * z.y;
        if z2 > BAILOUT_SQ {
            return Some(smooth_count(i, z, 2.0));
        }
        let next_reference = match orbit.get(i as usize) {
            Some(&r) if z2 >= dz.x * dz.x + dz.y * dz.y => r,
            _ => {
                return escape_time(FractalKind::Mandelbrot2D, z, c, 2.0, max_iter, i);
            }
        };
        // dz' = 2·Z·dz + dz² + dc
        dz = Point2::new(
            2.0 * (reference.x * dz.x - reference.y * dz.y) + dz.x * dz.x - dz.y * dz.y + dc.x,
            2.0 * (reference.x * dz.y + reference.y * dz.x) + 2.0 * dz.x * dz.y + dc.y,
        );
        reference = next_reference;
    }
    None
}

// ------------------------- Volumetric fractals -------------------------

fn normalize(p: Point3) -> Point3 {
    let len = p.length();
    if len > 0.0 {
        p * (1.0 / len)
    } else {
        p
    }
}

fn cross(a: Point3, b: Point3) -> Point3 {
    Point3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

fn rotate_y(p: Point3, angle: f64) -> Point3 {
    let (sin, cos) = angle.sin_cos();
    Point3::new(p.x * cos + p.z * sin, p.y, -p.x * sin + p.z * cos)
}

enum Estimator {
    Bulb { power: f64, julia: Option<Point3> },
    Quaternion { julia: Option<Point3> },
    Mandelbox {
        folding: f64,
        scale: f64,
        min_r2: f64,
        fixed_r2: f64,
    },
}

struct VolumeScene {
    estimator: Estimator,
    iterations: u32,
    max_steps: u32,
    ao_coef: f64,
    shadows: bool,
    cut: bool,
    rotate_y: f64,
    eye: Point3,
    look: Point3,
    right: Point3,
    up: Point3,
    focal: f64,
    far: f64,
    half_min: f64,
    center: Point2,
    color: [f64; 4],
    background: [f64; 4],
}

impl VolumeScene {
    fn new(kind: FractalKind, u: &Uniforms, size: (u32, u32)) -> Result<Self, RenderError> {
        let basis = FlyBasis::new(u.float("PHI")?, u.float("THETA")?);
        let look = -basis.forward;
        let right = basis.right;
        let up = normalize(cross(right, look));
        let estimator = match kind {
            FractalKind::Mandelbrot3D => Estimator::Bulb {
                power: u.float("POWER")?,
                julia: None,
            },
            FractalKind::Julia3D => Estimator::Bulb {
                power: u.float("POWER")?,
                julia: Some(u.point3("C")?),
            },
            FractalKind::Mandelbrot4D => Estimator::Quaternion { julia: None },
            FractalKind::Julia4D => Estimator::Quaternion {
                julia: Some(u.point3("C")?),
            },
            _ => Estimator::Mandelbox {
                folding: u.float("FOLDING")?,
                scale: u.float("SCALE")?,
                min_r2: u.float("IN_RAD")?.max(1e-6),
                fixed_r2: u.float("OUT_RAD")?.max(1e-6),
            },
        };
        let (eye, focal, far) = if kind == FractalKind::Mandelbox {
            (u.point3("OFFSET")?, FLY_FOCAL, FLY_FAR)
        } else {
            let distance = u.float("ZOOM")?;
            (basis.forward * distance, ORBIT_FOCAL, distance + 4.0)
        };
        let widget = WidgetSize::from(size);
        Ok(Self {
            estimator,
            iterations: u.int("MAX_ITER")?.max(1) as u32,
            max_steps: u.int("MAX_STEPS")?.max(1) as u32,
            ao_coef: u.float("AO_COEF")?.max(1.0),
            shadows: u.flag("SHADOWS"),
            cut: u.flag("CUT"),
            rotate_y: u.float("ROTATE_Y").unwrap_or(0.0),
            eye,
            look,
            right,
            up,
            focal,
            far,
            half_min: widget.min_side() / 2.0,
            center: widget.center(),
            color: u.color("COLOR")?,
            background: u.color("BG_COLOR")?,
        })
    }

    fn distance(&self, p: Point3) -> f64 {
        let p = rotate_y(p, self.rotate_y);
        let de = match self.estimator {
            Estimator::Bulb { power, julia } => bulb_de(p, power, julia, self.iterations),
            Estimator::Quaternion { julia } => quaternion_de(p, julia, self.iterations),
            Estimator::Mandelbox {
                folding,
                scale,
                min_r2,
                fixed_r2,
            } => mandelbox_de(p, folding, scale, min_r2, fixed_r2, self.iterations),
        };
        if self.cut {
            de.max(p.z)
        } else {
            de
        }
    }

    /// Returns the hit distance and the number of steps taken.
    fn march(&self, origin: Point3, dir: Point3) -> (Option<f64>, u32) {
        let mut t = 0.0;
        for step in 0..self.max_steps {
            let d = self.distance(origin + dir * t);
            if d < HIT_EPSILON * t.max(1.0) {
                return (Some(t), step);
            }
            t += d;
            if t > self.far {
                return (None, step);
            }
        }
        (None, self.max_steps)
    }

    fn normal(&self, p: Point3) -> Point3 {
        let e = HIT_EPSILON;
        let dx = Point3::new(e, 0.0, 0.0);
        let dy = Point3::new(0.0, e, 0.0);
        let dz = Point3::new(0.0, 0.0, e);
        normalize(Point3::new(
            self.distance(p + dx) - self.distance(p - dx),
            self.distance(p + dy) - self.distance(p - dy),
            self.distance(p + dz) - self.distance(p - dz),
        ))
    }

    fn sample(&self, pixel: Point2) -> [f64; 4] {
        let uv = Point2::new(
            (pixel.x - self.center.x) / self.half_min,
            -(pixel.y - self.center.y) / self.half_min,
        );
        let dir = normalize(self.look * self.focal + self.right * uv.x + self.up * uv.y);
        let (hit, steps) = self.march(self.eye, dir);
        let Some(t) = hit else {
            return self.background;
        };
        let p = self.eye + dir * t;
        let n = self.normal(p);
        let light = normalize(-self.look + self.up * 0.5 + self.right * 0.3);
        let mut diffuse = n.dot(light).max(0.0);
        if self.shadows && diffuse > 0.0 {
            let origin = p + n * (HIT_EPSILON * 10.0);
            if let (Some(_), _) = self.march(origin, light) {
                diffuse *= 0.35;
            }
        }
        let ao = (1.0 - steps as f64 / self.ao_coef).clamp(0.0, 1.0);
        let shade = (0.15 + 0.85 * diffuse) * ao;
        [
            self.color[0] * shade,
            self.color[1] * shade,
            self.color[2] * shade,
            self.color[3],
        ]
    }
}

fn bulb_de(p: Point3, power: f64, julia: Option<Point3>, iterations: u32) -> f64 {
    let c = julia.unwrap_or(p);
    let grow = if julia.is_some() { 0.0 } else { 1.0 };
    let mut z = p;
    let mut dr = 1.0;
    let mut r = z.length();
    for _ in 0..iterations {
        if r > 2.0 {
            break;
        }
        let theta = if r > 0.0 {
            (z.z / r).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };
        let phi = z.y.atan2(z.x);
        dr = r.powf(power - 1.0) * power * dr + grow;
        let zr = r.powf(power);
        let (theta, phi) = (theta * power, phi * power);
        z = Point3::new(theta.sin() * phi.cos(), phi.sin() * theta.sin(), theta.cos()) * zr + c;
        r = z.length();
    }
    let r = r.max(1e-12);
    0.5 * r.ln() * r / dr.max(1e-12)
}

fn quaternion_de(p: Point3, julia: Option<Point3>, iterations: u32) -> f64 {
    let mut z = [p.x, p.y, p.z, 0.0];
    let c = match julia {
        Some(c) => [c.x, c.y, c.z, 0.0],
        None => z,
    };
    let grow = if julia.is_some() { 0.0 } else { 1.0 };
    let norm = |q: [f64; 4]| (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    let mut dz = 1.0;
    for _ in 0..iterations {
        let r = norm(z);
        if r > 4.0 {
            break;
        }
        dz = 2.0 * r * dz + grow;
        z = [
            z[0] * z[0] - z[1] * z[1] - z[2] * z[2] - z[3] * z[3] + c[0],
            2.0 * z[0] * z[1] + c[1],
            2.0 * z[0] * z[2] + c[2],
            2.0 * z[0] * z[3] + c[3],
        ];
    }
    let r = norm(z).max(1e-12);
    0.5 * r * r.ln() / dz.max(1e-12)
}

fn mandelbox_de(
    p: Point3,
    folding: f64,
    scale: f64,
    min_r2: f64,
    fixed_r2: f64,
    iterations: u32,
) -> f64 {
    let fold = |v: f64| v.clamp(-folding, folding) * 2.0 - v;
    let mut z = p;
    let mut dr = 1.0;
    for _ in 0..iterations {
        z = Point3::new(fold(z.x), fold(z.y), fold(z.z));
        let r2 = z.dot(z);
        let k = if r2 < min_r2 {
            fixed_r2 / min_r2
        } else if r2 < fixed_r2 {
            fixed_r2 / r2
        } else {
            1.0
        };
        z = z * (k * scale) + p;
        dr = dr * k * scale.abs() + 1.0;
    }
    z.length() / dr.abs().max(1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fractal::FractalInstance;
    use crate::params::{ParamId, Rgba};
    use std::path::Path;

    fn render(kind: FractalKind, size: (u32, u32), edit: impl FnOnce(&mut FractalInstance)) -> RgbaImage {
        let mut fractal = FractalInstance::new(kind, Path::new("shaders")).unwrap();
        edit(&mut fractal);
        let uniforms = fractal.uniforms(size).unwrap();
        CpuRenderer::new().draw(kind, &uniforms, size).unwrap()
    }

    #[test]
    fn mandelbrot_centre_is_inside_and_corner_escapes() {
        let image = render(FractalKind::Mandelbrot2D, (33, 33), |_| {});
        assert_eq!(image.dimensions(), (33, 33));
        // The origin sits in the main cardioid.
        assert_eq!(image.get_pixel(16, 16).0, [0, 0, 0, 255]);
        // Corner (≈ -1, 1) escapes and takes a tint of the colour.
        assert!(image.get_pixel(0, 0).0[0] > 0);
    }

    #[test]
    fn perturbation_matches_direct_iteration() {
        let setup = |f: &mut FractalInstance| {
            let store = f.params_mut();
            store.set(ParamId::Offset, Point2::new(-0.75, 0.1)).unwrap();
            store.set(ParamId::ZoomFactor, 20.0).unwrap();
            store.set(ParamId::MaxIter, 200i64).unwrap();
        };
        let direct = render(FractalKind::Mandelbrot2D, (24, 16), setup);
        let perturbed = render(FractalKind::Mandelbrot2D, (24, 16), |f| {
            setup(f);
            f.params_mut().set(ParamId::Perturbation, true).unwrap();
        });
        let differing = direct
            .pixels()
            .zip(perturbed.pixels())
            .filter(|(a, b)| {
                a.0.iter()
                    .zip(b.0.iter())
                    .any(|(x, y)| (*x as i16 - *y as i16).abs() > 2)
            })
            .count();
        assert!(differing <= 4, "{differing} pixels differ");
    }

    #[test]
    fn central_lines_are_drawn() {
        let image = render(FractalKind::BurningShip2D, (20, 10), |f| {
            f.params_mut().set(ParamId::CentralLines, true).unwrap();
        });
        assert_eq!(image.get_pixel(10, 0).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(0, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn bulb_shows_background_and_surface() {
        let image = render(FractalKind::Mandelbrot3D, (16, 16), |f| {
            let store = f.params_mut();
            store.set(ParamId::BgColor, Rgba::new(0.0, 0.0, 1.0, 1.0)).unwrap();
            store.set(ParamId::Depth, 64i64).unwrap();
        });
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_ne!(image.get_pixel(8, 8).0, [0, 0, 255, 255]);
    }

    #[test]
    fn every_volume_kind_renders() {
        for kind in [
            FractalKind::Julia3D,
            FractalKind::Mandelbrot4D,
            FractalKind::Julia4D,
        ] {
            let image = render(kind, (8, 6), |f| {
                f.params_mut().set(ParamId::Depth, 32i64).unwrap();
            });
            assert_eq!(image.dimensions(), (8, 6), "{kind:?}");
        }
    }

    #[test]
    fn mandelbox_renders_from_default_position() {
        let image = render(FractalKind::Mandelbox, (12, 12), |f| {
            f.params_mut().set(ParamId::Depth, 64i64).unwrap();
        });
        assert_eq!(image.dimensions(), (12, 12));
    }

    #[test]
    fn zero_size_is_an_error() {
        let fractal = FractalInstance::new(FractalKind::Julia2D, Path::new("shaders")).unwrap();
        let uniforms = fractal.uniforms((0, 0)).unwrap();
        assert!(matches!(
            CpuRenderer::new().draw(FractalKind::Julia2D, &uniforms, (0, 10)),
            Err(RenderError::EmptyTarget)
        ));
    }

    #[test]
    fn distance_estimators_are_positive_far_away() {
        let far = Point3::new(0.0, 0.0, 10.0);
        assert!(bulb_de(far, 8.0, None, 10) > 1.0);
        assert!(quaternion_de(far, None, 10) > 1.0);
        assert!(mandelbox_de(Point3::new(0.0, 0.0, 60.0), 4.245, 2.051, 3.238, 5.0, 20) > 1.0);
        assert!(bulb_de(Point3::ZERO, 8.0, None, 10) < HIT_EPSILON);
    }
}
