//! Pointer, wheel and keyboard handling for the three navigation schemes.
//!
//! The controller never touches the windowing layer. Cursor grabs and warps
//! are handed back to the front end through [`NavResponse`].

use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::{ViewTransform, WidgetSize};
use crate::params::{ParamError, ParamId, ParameterStore, Point2, Point3};

/// Wheel units per notch, as reported by most desktop mice.
pub const WHEEL_NOTCH: f64 = 120.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// 2D pan, wheel zoom and right-click recentre.
    Plane,
    /// 3D camera orbiting the origin.
    Orbit,
    /// 3D free flight with mouse look.
    Fly,
}

impl NavigationMode {
    pub fn label(&self) -> &'static str {
        match self {
            NavigationMode::Plane => "Pan / zoom",
            NavigationMode::Orbit => "Orbit",
            NavigationMode::Fly => "Fly",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZoomAnchor {
    #[default]
    Cursor,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorCommand {
    /// Hide and confine the cursor, then place it at `anchor`.
    Grab { anchor: Point2 },
    /// Put the cursor back at the look anchor.
    Warp(Point2),
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NavResponse {
    pub cursor: Option<CursorCommand>,
}

impl NavResponse {
    fn cursor(command: CursorCommand) -> Self {
        Self {
            cursor: Some(command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MovementFlags {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl MovementFlags {
    fn slot(&mut self, key: NavKey) -> Option<&mut bool> {
        match key {
            NavKey::Forward => Some(&mut self.forward),
            NavKey::Back => Some(&mut self.back),
            NavKey::Left => Some(&mut self.left),
            NavKey::Right => Some(&mut self.right),
            NavKey::Up => Some(&mut self.up),
            NavKey::Down => Some(&mut self.down),
            NavKey::Escape => None,
        }
    }

    pub fn any(&self) -> bool {
        self.forward || self.back || self.left || self.right || self.up || self.down
    }

    pub fn clear(&mut self) {
        *self = MovementFlags::default();
    }
}

/// Fly camera basis for the given horizontal and vertical angles.
///
/// The camera looks along `-forward`.
pub struct FlyBasis {
    pub forward: Point3,
    pub right: Point3,
    pub up: Point3,
}

impl FlyBasis {
    pub fn new(h_angle: f64, v_angle: f64) -> Self {
        let (sin_h, cos_h) = h_angle.sin_cos();
        let (sin_v, cos_v) = v_angle.sin_cos();
        Self {
            forward: Point3::new(sin_h * cos_v, -sin_v, cos_h * cos_v),
            right: Point3::new(cos_h, 0.0, -sin_h),
            up: Point3::new(0.0, 1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationController {
    mode: NavigationMode,
    zoom_anchor: ZoomAnchor,
    drag_from: Option<Point2>,
    look_anchor: Option<Point2>,
    movement: MovementFlags,
}

impl NavigationController {
    pub fn new(mode: NavigationMode) -> Self {
        Self {
            mode,
            zoom_anchor: ZoomAnchor::default(),
            drag_from: None,
            look_anchor: None,
            movement: MovementFlags::default(),
        }
    }

    pub fn with_zoom_anchor(mut self, anchor: ZoomAnchor) -> Self {
        self.zoom_anchor = anchor;
        self
    }

    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_from.is_some()
    }

    pub fn is_looking(&self) -> bool {
        self.look_anchor.is_some()
    }

    pub fn movement(&self) -> MovementFlags {
        self.movement
    }

    /// Drops any in-flight drag or look state, e.g. when the fractal changes.
    pub fn reset(&mut self) -> NavResponse {
        self.drag_from = None;
        self.movement.clear();
        if self.look_anchor.take().is_some() {
            NavResponse::cursor(CursorCommand::Release)
        } else {
            NavResponse::default()
        }
    }

    fn plane_view(store: &ParameterStore) -> Result<ViewTransform, ParamError> {
        Ok(ViewTransform::new(
            store.float(ParamId::ZoomFactor)?,
            store.float(ParamId::RotationAngle)?,
            store.point2(ParamId::Offset)?,
        ))
    }

    pub fn pointer_pressed(
        &mut self,
        store: &mut ParameterStore,
        button: PointerButton,
        pos: Point2,
        size: WidgetSize,
    ) -> Result<NavResponse, ParamError> {
        if size.is_degenerate() {
            return Ok(NavResponse::default());
        }
        match (self.mode, button) {
            (NavigationMode::Plane | NavigationMode::Orbit, PointerButton::Primary) => {
                self.drag_from = Some(pos);
            }
            (NavigationMode::Plane, PointerButton::Secondary) => {
                let view = Self::plane_view(store)?;
                if let Some(target) = view.widget_to_fractal(pos, size) {
                    store.set(ParamId::Offset, target)?;
                }
            }
            (NavigationMode::Fly, PointerButton::Primary) if self.look_anchor.is_none() => {
                let anchor = size.center();
                self.look_anchor = Some(anchor);
                debug!("fly look mode engaged");
                return Ok(NavResponse::cursor(CursorCommand::Grab { anchor }));
            }
            _ => {}
        }
        Ok(NavResponse::default())
    }

    pub fn pointer_released(&mut self, button: PointerButton) {
        if button == PointerButton::Primary {
            self.drag_from = None;
        }
    }

    pub fn pointer_moved(
        &mut self,
        store: &mut ParameterStore,
        pos: Point2,
        size: WidgetSize,
    ) -> Result<NavResponse, ParamError> {
        if size.is_degenerate() {
            return Ok(NavResponse::default());
        }
        match self.mode {
            NavigationMode::Plane => {
                let Some(last) = self.drag_from else {
                    return Ok(NavResponse::default());
                };
                let view = Self::plane_view(store)?;
                if let (Some(a), Some(b)) =
                    (view.widget_to_fractal(last, size), view.widget_to_fractal(pos, size))
                {
                    store.set(ParamId::Offset, view.offset - (b - a))?;
                }
                self.drag_from = Some(pos);
            }
            NavigationMode::Orbit => {
                let Some(last) = self.drag_from else {
                    return Ok(NavResponse::default());
                };
                let delta = pos - last;
                let h = store.float(ParamId::HAngle)?;
                let v = store.float(ParamId::VAngle)?;
                store.set(ParamId::HAngle, h - delta.x / 100.0)?;
                store.set(ParamId::VAngle, v - delta.y / 100.0)?;
                self.drag_from = Some(pos);
            }
            NavigationMode::Fly => {
                let Some(anchor) = self.look_anchor else {
                    return Ok(NavResponse::default());
                };
                let delta = pos - anchor;
                if delta == Point2::ZERO {
                    return Ok(NavResponse::default());
                }
                let h = store.float(ParamId::HAngle)?;
                store.set(ParamId::HAngle, h - delta.x / 100.0)?;
                let v = store.float(ParamId::VAngle)? - delta.y / 100.0;
                if v > -FRAC_PI_2 && v < FRAC_PI_2 {
                    store.set(ParamId::VAngle, v)?;
                }
                return Ok(NavResponse::cursor(CursorCommand::Warp(anchor)));
            }
        }
        Ok(NavResponse::default())
    }

    /// `delta` is in wheel units, positive away from the user.
    pub fn wheel(
        &mut self,
        store: &mut ParameterStore,
        delta: f64,
        cursor: Option<Point2>,
        size: WidgetSize,
    ) -> Result<(), ParamError> {
        if size.is_degenerate() || delta == 0.0 {
            return Ok(());
        }
        match self.mode {
            NavigationMode::Plane => {
                let view = Self::plane_view(store)?;
                let zoom = view.zoom * 1.1f64.powf(delta / 100.0);
                let anchored = match (self.zoom_anchor, cursor) {
                    (ZoomAnchor::Cursor, Some(cursor)) => {
                        view.anchored(cursor, size, zoom, view.rotation)
                    }
                    _ => None,
                };
                store.set(ParamId::ZoomFactor, zoom)?;
                if let Some(anchored) = anchored {
                    store.set(ParamId::Offset, anchored.offset)?;
                }
            }
            NavigationMode::Orbit => {
                let zoom = store.float(ParamId::ZoomFactor)?;
                store.set(ParamId::ZoomFactor, zoom / 1.01f64.powf(delta / 100.0))?;
            }
            NavigationMode::Fly => {
                let speed = store.float(ParamId::Speed)? + delta / 100_000.0;
                if speed > 0.0 {
                    store.set(ParamId::Speed, speed)?;
                }
            }
        }
        Ok(())
    }

    pub fn key_pressed(&mut self, key: NavKey) -> NavResponse {
        if self.mode != NavigationMode::Fly || self.look_anchor.is_none() {
            return NavResponse::default();
        }
        if key == NavKey::Escape {
            self.look_anchor = None;
            self.movement.clear();
            debug!("fly look mode released");
            return NavResponse::cursor(CursorCommand::Release);
        }
        if let Some(flag) = self.movement.slot(key) {
            *flag = true;
        }
        NavResponse::default()
    }

    pub fn key_released(&mut self, key: NavKey) {
        if let Some(flag) = self.movement.slot(key) {
            *flag = false;
        }
    }

    /// Advances fly movement by one tick. Returns whether the camera moved.
    pub fn tick(&mut self, store: &mut ParameterStore) -> Result<bool, ParamError> {
        if self.mode != NavigationMode::Fly || !self.movement.any() {
            return Ok(false);
        }
        let speed = store.float(ParamId::Speed)?;
        let basis = FlyBasis::new(store.float(ParamId::HAngle)?, store.float(ParamId::VAngle)?);
        let mut offset = store.point3(ParamId::Offset)?;
        let flags = self.movement;
        if flags.forward {
            offset -= basis.forward * speed;
        }
        if flags.back {
            offset += basis.forward * speed;
        }
        if flags.left {
            offset -= basis.right * speed;
        }
        if flags.right {
            offset += basis.right * speed;
        }
        if flags.up {
            offset += basis.up * speed;
        }
        if flags.down {
            offset -= basis.up * speed;
        }
        store.set(ParamId::Offset, offset)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;
    const SIZE: WidgetSize = WidgetSize::new(480.0, 480.0);

    fn assert_approx_eq(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPSILON,
            "actual={} expected={}",
            actual,
            expected
        );
    }

    fn plane_store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.register(ParamId::ZoomFactor, 1.0).unwrap();
        store.register(ParamId::RotationAngle, 0.0).unwrap();
        store.register(ParamId::Offset, Point2::ZERO).unwrap();
        store
    }

    fn orbit_store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.register(ParamId::ZoomFactor, 2.8).unwrap();
        store.register(ParamId::HAngle, 0.0).unwrap();
        store.register(ParamId::VAngle, 0.0).unwrap();
        store
    }

    fn fly_store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.register(ParamId::Offset, Point3::new(0.0, 0.0, 50.0)).unwrap();
        store.register(ParamId::HAngle, 0.0).unwrap();
        store.register(ParamId::VAngle, 0.0).unwrap();
        store.register(ParamId::Speed, 0.1).unwrap();
        store
    }

    #[test]
    fn wheel_zoom_is_multiplicative() {
        let mut store = plane_store();
        let mut nav = NavigationController::new(NavigationMode::Plane);
        let deltas = [120.0, -240.0, 360.0, 15.0];
        for d in deltas {
            nav.wheel(&mut store, d, Some(Point2::new(13.0, 400.0)), SIZE).unwrap();
        }
        let expected: f64 = deltas.iter().map(|d| 1.1f64.powf(d / 100.0)).product();
        assert!((store.float(ParamId::ZoomFactor).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn wheel_at_cursor_keeps_point_fixed() {
        let mut store = plane_store();
        let mut nav = NavigationController::new(NavigationMode::Plane);
        let cursor = Point2::new(100.0, 50.0);
        let before = NavigationController::plane_view(&store)
            .unwrap()
            .widget_to_fractal(cursor, SIZE)
            .unwrap();
        nav.wheel(&mut store, 360.0, Some(cursor), SIZE).unwrap();
        let after = NavigationController::plane_view(&store)
            .unwrap()
            .widget_to_fractal(cursor, SIZE)
            .unwrap();
        assert_approx_eq(after.x, before.x);
        assert_approx_eq(after.y, before.y);
    }

    #[test]
    fn centre_anchor_leaves_offset() {
        let mut store = plane_store();
        let mut nav =
            NavigationController::new(NavigationMode::Plane).with_zoom_anchor(ZoomAnchor::Center);
        nav.wheel(&mut store, 120.0, Some(Point2::new(3.0, 3.0)), SIZE).unwrap();
        assert_eq!(store.point2(ParamId::Offset).unwrap(), Point2::ZERO);
    }

    #[test]
    fn drag_there_and_back_restores_offset() {
        let mut store = plane_store();
        store.set(ParamId::RotationAngle, 0.7).unwrap();
        store.set(ParamId::ZoomFactor, 3.3).unwrap();
        let mut nav = NavigationController::new(NavigationMode::Plane);
        let a = Point2::new(100.0, 100.0);
        let b = Point2::new(250.0, 40.0);
        nav.pointer_pressed(&mut store, PointerButton::Primary, a, SIZE).unwrap();
        nav.pointer_moved(&mut store, b, SIZE).unwrap();
        nav.pointer_moved(&mut store, a, SIZE).unwrap();
        nav.pointer_released(PointerButton::Primary);
        let offset = store.point2(ParamId::Offset).unwrap();
        assert_approx_eq(offset.x, 0.0);
        assert_approx_eq(offset.y, 0.0);
        assert!(!nav.is_dragging());
    }

    #[test]
    fn drag_moves_plane_with_the_cursor() {
        let mut store = plane_store();
        let mut nav = NavigationController::new(NavigationMode::Plane);
        nav.pointer_pressed(&mut store, PointerButton::Primary, Point2::new(240.0, 240.0), SIZE)
            .unwrap();
        nav.pointer_moved(&mut store, Point2::new(250.0, 240.0), SIZE).unwrap();
        let offset = store.point2(ParamId::Offset).unwrap();
        assert_approx_eq(offset.x, -10.0 * 2.0 / 480.0);
        assert_approx_eq(offset.y, 0.0);
    }

    #[test]
    fn move_without_press_is_ignored() {
        let mut store = plane_store();
        let mut nav = NavigationController::new(NavigationMode::Plane);
        store.take_redraw();
        nav.pointer_moved(&mut store, Point2::new(10.0, 10.0), SIZE).unwrap();
        assert!(!store.take_redraw());
    }

    #[test]
    fn right_click_recentres() {
        let mut store = plane_store();
        let mut nav = NavigationController::new(NavigationMode::Plane);
        nav.pointer_pressed(&mut store, PointerButton::Secondary, Point2::new(480.0, 0.0), SIZE)
            .unwrap();
        let offset = store.point2(ParamId::Offset).unwrap();
        assert_approx_eq(offset.x, 1.0);
        assert_approx_eq(offset.y, 1.0);
    }

    #[test]
    fn zero_sized_widget_is_a_no_op() {
        let mut store = plane_store();
        let mut nav = NavigationController::new(NavigationMode::Plane);
        let empty = WidgetSize::new(0.0, 0.0);
        nav.pointer_pressed(&mut store, PointerButton::Secondary, Point2::new(1.0, 1.0), empty)
            .unwrap();
        nav.wheel(&mut store, 120.0, None, empty).unwrap();
        assert_eq!(store.float(ParamId::ZoomFactor).unwrap(), 1.0);
        assert_eq!(store.point2(ParamId::Offset).unwrap(), Point2::ZERO);
    }

    #[test]
    fn orbit_drag_and_wheel() {
        let mut store = orbit_store();
        let mut nav = NavigationController::new(NavigationMode::Orbit);
        nav.pointer_pressed(&mut store, PointerButton::Primary, Point2::new(10.0, 10.0), SIZE)
            .unwrap();
        nav.pointer_moved(&mut store, Point2::new(60.0, -20.0), SIZE).unwrap();
        assert_approx_eq(store.float(ParamId::HAngle).unwrap(), -0.5);
        assert_approx_eq(store.float(ParamId::VAngle).unwrap(), 0.3);

        nav.wheel(&mut store, 100.0, None, SIZE).unwrap();
        assert_approx_eq(store.float(ParamId::ZoomFactor).unwrap(), 2.8 / 1.01);
    }

    #[test]
    fn fly_look_clamps_vertical_angle() {
        let mut store = fly_store();
        let mut nav = NavigationController::new(NavigationMode::Fly);
        let response = nav
            .pointer_pressed(&mut store, PointerButton::Primary, Point2::new(3.0, 3.0), SIZE)
            .unwrap();
        assert_eq!(
            response.cursor,
            Some(CursorCommand::Grab {
                anchor: SIZE.center()
            })
        );

        let response = nav.pointer_moved(&mut store, Point2::new(250.0, 100.0), SIZE).unwrap();
        assert_eq!(response.cursor, Some(CursorCommand::Warp(SIZE.center())));
        assert_approx_eq(store.float(ParamId::HAngle).unwrap(), -0.1);
        assert_approx_eq(store.float(ParamId::VAngle).unwrap(), 1.4);

        // A further 0.5 rad upward would leave (-pi/2, pi/2).
        nav.pointer_moved(&mut store, Point2::new(240.0, 190.0), SIZE).unwrap();
        assert_approx_eq(store.float(ParamId::VAngle).unwrap(), 1.4);
    }

    #[test]
    fn fly_forward_moves_against_forward_axis() {
        let mut store = fly_store();
        let mut nav = NavigationController::new(NavigationMode::Fly);
        nav.pointer_pressed(&mut store, PointerButton::Primary, Point2::ZERO, SIZE).unwrap();
        nav.key_pressed(NavKey::Forward);
        assert!(nav.tick(&mut store).unwrap());
        let offset = store.point3(ParamId::Offset).unwrap();
        assert_approx_eq(offset.z, 49.9);

        nav.key_released(NavKey::Forward);
        nav.key_pressed(NavKey::Up);
        nav.key_pressed(NavKey::Right);
        nav.tick(&mut store).unwrap();
        let offset = store.point3(ParamId::Offset).unwrap();
        assert_approx_eq(offset.x, 0.1);
        assert_approx_eq(offset.y, 0.1);
    }

    #[test]
    fn escape_releases_grab_and_clears_flags() {
        let mut store = fly_store();
        let mut nav = NavigationController::new(NavigationMode::Fly);
        nav.pointer_pressed(&mut store, PointerButton::Primary, Point2::ZERO, SIZE).unwrap();
        nav.key_pressed(NavKey::Left);
        nav.key_pressed(NavKey::Down);
        let response = nav.key_pressed(NavKey::Escape);
        assert_eq!(response.cursor, Some(CursorCommand::Release));
        assert!(!nav.movement().any());
        assert!(!nav.is_looking());
        assert!(!nav.tick(&mut store).unwrap());
    }

    #[test]
    fn keys_outside_look_mode_do_nothing() {
        let mut nav = NavigationController::new(NavigationMode::Fly);
        nav.key_released(NavKey::Back);
        nav.key_pressed(NavKey::Forward);
        assert!(!nav.movement().any());
    }

    #[test]
    fn fly_speed_stays_positive() {
        let mut store = fly_store();
        let mut nav = NavigationController::new(NavigationMode::Fly);
        nav.wheel(&mut store, -20_000.0, None, SIZE).unwrap();
        assert_approx_eq(store.float(ParamId::Speed).unwrap(), 0.1);
        nav.wheel(&mut store, 5_000.0, None, SIZE).unwrap();
        assert_approx_eq(store.float(ParamId::Speed).unwrap(), 0.15);
    }
}
