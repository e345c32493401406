//! Named uniform values handed to a renderer for one frame.

use crate::params::Point2;

/// Squared magnitude at which the reference orbit stops.
pub const ORBIT_ESCAPE_SQ: f64 = 512.0;
/// Value of reference orbit slots past the escape iteration.
pub const ORBIT_FILL: f64 = 5.0;
/// Longest reference orbit ever built, whatever the iteration count.
pub const MAX_ORBIT_LEN: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Double(f64),
    Vec2([f32; 2]),
    DVec2([f64; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    pub fn flag(on: bool) -> Self {
        UniformValue::Int(on as i32)
    }

    /// Widens the value into one `vec4<f32>` slot for GPU upload.
    pub fn to_slot(&self) -> [f32; 4] {
        match *self {
            UniformValue::Int(v) => [v as f32, 0.0, 0.0, 0.0],
            UniformValue::Float(v) => [v, 0.0, 0.0, 0.0],
            UniformValue::Double(v) => {
                let hi = v as f32;
                [hi, (v - hi as f64) as f32, 0.0, 0.0]
            }
            UniformValue::Vec2([x, y]) => [x, y, 0.0, 0.0],
            UniformValue::DVec2([x, y]) => {
                let (hx, hy) = (x as f32, y as f32);
                [hx, hy, (x - hx as f64) as f32, (y - hy as f64) as f32]
            }
            UniformValue::Vec3([x, y, z]) => [x, y, z, 0.0],
            UniformValue::Vec4(v) => v,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            UniformValue::Int(v) => Some(v as f64),
            UniformValue::Float(v) => Some(v as f64),
            UniformValue::Double(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSet {
    entries: Vec<(&'static str, UniformValue)>,
    reference_orbit: Option<Vec<[f64; 2]>>,
}

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, value: UniformValue) {
        debug_assert!(self.get(name).is_none(), "uniform {name} pushed twice");
        self.entries.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, UniformValue)> + '_ {
        self.entries.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(n, _)| *n).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_reference_orbit(&mut self, orbit: Vec<[f64; 2]>) {
        self.reference_orbit = Some(orbit);
    }

    pub fn reference_orbit(&self) -> Option<&[[f64; 2]]> {
        self.reference_orbit.as_deref()
    }

    pub fn slots(&self) -> Vec<[f32; 4]> {
        self.entries.iter().map(|(_, v)| v.to_slot()).collect()
    }
}

/// High-precision orbit of `z -> z² + c` starting at zero, used for
/// perturbation rendering. `max_iter` entries long, capped at
/// [`MAX_ORBIT_LEN`]; renderers iterate directly past the end.
pub fn reference_orbit(c: Point2, max_iter: usize) -> Vec<[f64; 2]> {
    let mut orbit = vec![[ORBIT_FILL, ORBIT_FILL]; max_iter.min(MAX_ORBIT_LEN)];
    let (mut x, mut y) = (0.0f64, 0.0f64);
    for slot in orbit.iter_mut() {
        let nx = x * x - y * y + c.x;
        y = 2.0 * x * y + c.y;
        x = nx;
        *slot = [x, y];
        if x * x + y * y >= ORBIT_ESCAPE_SQ {
            break;
        }
    }
    orbit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_inside_the_set_never_escapes() {
        let orbit = reference_orbit(Point2::new(-1.0, 0.0), 6);
        assert_eq!(
            orbit,
            vec![[-1.0, 0.0], [0.0, 0.0], [-1.0, 0.0], [0.0, 0.0], [-1.0, 0.0], [0.0, 0.0]]
        );
    }

    #[test]
    fn escaped_orbit_is_padded() {
        let orbit = reference_orbit(Point2::new(10.0, 0.0), 5);
        assert_eq!(orbit[0], [10.0, 0.0]);
        // 110² ≥ 512 so the second entry is the last computed one.
        assert_eq!(orbit[1], [110.0, 0.0]);
        assert_eq!(&orbit[2..], &[[ORBIT_FILL, ORBIT_FILL]; 3]);
    }

    #[test]
    fn orbit_length_is_capped() {
        let orbit = reference_orbit(Point2::new(-1.0, 0.0), 1 << 40);
        assert_eq!(orbit.len(), MAX_ORBIT_LEN);
    }

    #[test]
    fn zero_iterations_gives_empty_orbit() {
        assert!(reference_orbit(Point2::ZERO, 0).is_empty());
    }

    #[test]
    fn double_slots_keep_the_low_bits() {
        let v = 0.1f64 + 1e-12;
        let slot = UniformValue::Double(v).to_slot();
        let rebuilt = slot[0] as f64 + slot[1] as f64;
        assert!((rebuilt - v).abs() < 1e-14);
    }

    #[test]
    fn set_preserves_order() {
        let mut set = UniformSet::new();
        set.push("RES", UniformValue::Vec2([640.0, 480.0]));
        set.push("MAX_ITER", UniformValue::Int(100));
        set.push("AA", UniformValue::Int(1));
        assert_eq!(set.names(), vec!["RES", "MAX_ITER", "AA"]);
        assert_eq!(set.get("MAX_ITER"), Some(UniformValue::Int(100)));
        assert_eq!(set.get("ZOOM"), None);
    }
}
