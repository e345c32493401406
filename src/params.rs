//! Typed parameter storage for a single fractal instance.
//!
//! Every fractal owns one [`ParameterStore`]. Values are addressed by the
//! closed [`ParamId`] enum; the snake_case name of an id doubles as its
//! persisted key. Any successful mutation marks the store dirty, and the
//! front end consumes that flag once per paint through
//! [`ParameterStore::take_redraw`].

use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

// ------------------------- Value types -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const ZERO: Point2 = Point2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }
}

impl Add for Point2 {
    type Output = Point2;
    fn add(self, rhs: Point2) -> Point2 {
        Point2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2 {
    type Output = Point2;
    fn sub(self, rhs: Point2) -> Point2 {
        Point2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2 {
    type Output = Point2;
    fn mul(self, rhs: f64) -> Point2 {
        Point2::new(self.x * rhs, self.y * rhs)
    }
}

impl AddAssign for Point2 {
    fn add_assign(&mut self, rhs: Point2) {
        *self = *self + rhs;
    }
}

impl SubAssign for Point2 {
    fn sub_assign(&mut self, rhs: Point2) {
        *self = *self - rhs;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ZERO: Point3 = Point3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Point3) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }
}

impl Add for Point3 {
    type Output = Point3;
    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;
    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3 {
    type Output = Point3;
    fn mul(self, rhs: f64) -> Point3 {
        Point3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Point3 {
    type Output = Point3;
    fn neg(self) -> Point3 {
        Point3::new(-self.x, -self.y, -self.z)
    }
}

impl AddAssign for Point3 {
    fn add_assign(&mut self, rhs: Point3) {
        *self = *self + rhs;
    }
}

impl SubAssign for Point3 {
    fn sub_assign(&mut self, rhs: Point3) {
        *self = *self - rhs;
    }
}

/// Linear RGBA colour with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::WHITE
    }
}

// ------------------------- Identity -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    Color,
    Point2,
    Point3,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::Color => "color",
            ParamKind::Point2 => "point2",
            ParamKind::Point3 => "point3",
        };
        f.write_str(name)
    }
}

/// Every parameter any fractal kind can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    MaxIter,
    ZoomFactor,
    CentralLines,
    RotationAngle,
    Color,
    BgColor,
    Power,
    Offset,
    Antialiasing,
    Perturbation,
    ArgC,
    AbsC,
    ArgxC,
    ArgyC,
    HAngle,
    VAngle,
    RotateY,
    Cut,
    Shadows,
    Depth,
    Ao,
    Folding,
    Scale,
    OutRad,
    InRad,
    Speed,
    HighScreenshotQuality,
}

impl ParamId {
    pub const ALL: [ParamId; 27] = [
        ParamId::MaxIter,
        ParamId::ZoomFactor,
        ParamId::CentralLines,
        ParamId::RotationAngle,
        ParamId::Color,
        ParamId::BgColor,
        ParamId::Power,
        ParamId::Offset,
        ParamId::Antialiasing,
        ParamId::Perturbation,
        ParamId::ArgC,
        ParamId::AbsC,
        ParamId::ArgxC,
        ParamId::ArgyC,
        ParamId::HAngle,
        ParamId::VAngle,
        ParamId::RotateY,
        ParamId::Cut,
        ParamId::Shadows,
        ParamId::Depth,
        ParamId::Ao,
        ParamId::Folding,
        ParamId::Scale,
        ParamId::OutRad,
        ParamId::InRad,
        ParamId::Speed,
        ParamId::HighScreenshotQuality,
    ];

    /// Stable key used in persisted state.
    pub fn name(&self) -> &'static str {
        match self {
            ParamId::MaxIter => "max_iter",
            ParamId::ZoomFactor => "zoom_factor",
            ParamId::CentralLines => "central_lines",
            ParamId::RotationAngle => "rotation_angle",
            ParamId::Color => "color",
            ParamId::BgColor => "bg_color",
            ParamId::Power => "power",
            ParamId::Offset => "offset",
            ParamId::Antialiasing => "antialiasing",
            ParamId::Perturbation => "perturbation",
            ParamId::ArgC => "arg_c",
            ParamId::AbsC => "abs_c",
            ParamId::ArgxC => "argx_c",
            ParamId::ArgyC => "argy_c",
            ParamId::HAngle => "h_angle",
            ParamId::VAngle => "v_angle",
            ParamId::RotateY => "rotate_y",
            ParamId::Cut => "cut",
            ParamId::Shadows => "shadows",
            ParamId::Depth => "depth",
            ParamId::Ao => "ao",
            ParamId::Folding => "folding",
            ParamId::Scale => "scale",
            ParamId::OutRad => "out_rad",
            ParamId::InRad => "in_rad",
            ParamId::Speed => "speed",
            ParamId::HighScreenshotQuality => "high_screenshot_quality",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParamId::MaxIter => "Iterations",
            ParamId::ZoomFactor => "Zoom",
            ParamId::CentralLines => "Central lines",
            ParamId::RotationAngle => "Rotation",
            ParamId::Color => "Color",
            ParamId::BgColor => "Background",
            ParamId::Power => "Power",
            ParamId::Offset => "Offset",
            ParamId::Antialiasing => "Antialiasing",
            ParamId::Perturbation => "Perturbation",
            ParamId::ArgC => "arg(c)",
            ParamId::AbsC => "|c|",
            ParamId::ArgxC => "arg_x(c)",
            ParamId::ArgyC => "arg_y(c)",
            ParamId::HAngle => "Horizontal angle",
            ParamId::VAngle => "Vertical angle",
            ParamId::RotateY => "Rotate Y",
            ParamId::Cut => "Cut",
            ParamId::Shadows => "Shadows",
            ParamId::Depth => "Ray steps",
            ParamId::Ao => "Ambient occlusion",
            ParamId::Folding => "Folding limit",
            ParamId::Scale => "Scale",
            ParamId::OutRad => "Outer radius",
            ParamId::InRad => "Inner radius",
            ParamId::Speed => "Speed",
            ParamId::HighScreenshotQuality => "High quality screenshots",
        }
    }

    pub fn from_name(name: &str) -> Option<ParamId> {
        ParamId::ALL.iter().copied().find(|id| id.name() == name)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Color(Rgba),
    Point2(Point2),
    Point3(Point3),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Color(_) => ParamKind::Color,
            ParamValue::Point2(_) => ParamKind::Point2,
            ParamValue::Point3(_) => ParamKind::Point3,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<Rgba> for ParamValue {
    fn from(v: Rgba) -> Self {
        ParamValue::Color(v)
    }
}

impl From<Point2> for ParamValue {
    fn from(v: Point2) -> Self {
        ParamValue::Point2(v)
    }
}

impl From<Point3> for ParamValue {
    fn from(v: Point3) -> Self {
        ParamValue::Point3(v)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("parameter `{name}` holds {expected}, got {got}")]
    TypeMismatch {
        name: &'static str,
        expected: ParamKind,
        got: ParamKind,
    },
    #[error("parameter `{0}` registered twice")]
    DuplicateParameter(&'static str),
}

// ------------------------- Store -------------------------

#[derive(Debug, Clone)]
struct Slot {
    id: ParamId,
    value: ParamValue,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    slots: Vec<Slot>,
    index: HashMap<ParamId, usize>,
    dirty: bool,
    revision: u64,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: ParamId,
        default: impl Into<ParamValue>,
    ) -> Result<(), ParamError> {
        if self.index.contains_key(&id) {
            return Err(ParamError::DuplicateParameter(id.name()));
        }
        self.index.insert(id, self.slots.len());
        self.slots.push(Slot {
            id,
            value: default.into(),
        });
        self.dirty = true;
        Ok(())
    }

    pub fn contains(&self, id: ParamId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, id: ParamId) -> Result<&Slot, ParamError> {
        self.index
            .get(&id)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| ParamError::UnknownParameter(id.name().to_string()))
    }

    pub fn get(&self, id: ParamId) -> Result<ParamValue, ParamError> {
        self.slot(id).map(|slot| slot.value)
    }

    pub fn get_by_name(&self, name: &str) -> Result<ParamValue, ParamError> {
        let id = ParamId::from_name(name)
            .ok_or_else(|| ParamError::UnknownParameter(name.to_string()))?;
        self.get(id)
    }

    /// Replaces a value. The new value must have the registered kind.
    pub fn set(&mut self, id: ParamId, value: impl Into<ParamValue>) -> Result<(), ParamError> {
        let value = value.into();
        let i = *self
            .index
            .get(&id)
            .ok_or_else(|| ParamError::UnknownParameter(id.name().to_string()))?;
        let slot = &mut self.slots[i];
        if slot.value.kind() != value.kind() {
            return Err(ParamError::TypeMismatch {
                name: id.name(),
                expected: slot.value.kind(),
                got: value.kind(),
            });
        }
        slot.value = value;
        self.dirty = true;
        self.revision += 1;
        Ok(())
    }

    pub fn set_by_name(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), ParamError> {
        let id = ParamId::from_name(name)
            .ok_or_else(|| ParamError::UnknownParameter(name.to_string()))?;
        self.set(id, value)
    }

    fn mismatch(id: ParamId, expected: ParamKind, got: ParamValue) -> ParamError {
        ParamError::TypeMismatch {
            name: id.name(),
            expected,
            got: got.kind(),
        }
    }

    pub fn int(&self, id: ParamId) -> Result<i64, ParamError> {
        match self.get(id)? {
            ParamValue::Int(v) => Ok(v),
            other => Err(Self::mismatch(id, ParamKind::Int, other)),
        }
    }

    pub fn float(&self, id: ParamId) -> Result<f64, ParamError> {
        match self.get(id)? {
            ParamValue::Float(v) => Ok(v),
            other => Err(Self::mismatch(id, ParamKind::Float, other)),
        }
    }

    pub fn flag(&self, id: ParamId) -> Result<bool, ParamError> {
        match self.get(id)? {
            ParamValue::Bool(v) => Ok(v),
            other => Err(Self::mismatch(id, ParamKind::Bool, other)),
        }
    }

    pub fn color(&self, id: ParamId) -> Result<Rgba, ParamError> {
        match self.get(id)? {
            ParamValue::Color(v) => Ok(v),
            other => Err(Self::mismatch(id, ParamKind::Color, other)),
        }
    }

    pub fn point2(&self, id: ParamId) -> Result<Point2, ParamError> {
        match self.get(id)? {
            ParamValue::Point2(v) => Ok(v),
            other => Err(Self::mismatch(id, ParamKind::Point2, other)),
        }
    }

    pub fn point3(&self, id: ParamId) -> Result<Point3, ParamError> {
        match self.get(id)? {
            ParamValue::Point3(v) => Ok(v),
            other => Err(Self::mismatch(id, ParamKind::Point3, other)),
        }
    }

    /// Parameters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamId, ParamValue)> + '_ {
        self.slots.iter().map(|slot| (slot.id, slot.value))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn request_redraw(&mut self) {
        self.dirty = true;
    }

    /// Returns `true` once per batch of mutations and clears the flag.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Number of successful `set` calls since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
