//! Screen space ↔ fractal plane mapping.
//!
//! Widget coordinates are y-down pixels with the origin at the top-left
//! corner. The fractal plane is y-up; the widget centre maps to `offset`,
//! and the shorter widget side spans `2 / zoom` plane units.

use crate::params::Point2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetSize {
    pub width: f64,
    pub height: f64,
}

impl WidgetSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn min_side(&self) -> f64 {
        self.width.min(self.height)
    }
}

impl From<(u32, u32)> for WidgetSize {
    fn from((w, h): (u32, u32)) -> Self {
        WidgetSize::new(w as f64, h as f64)
    }
}

/// Rotates `p` counter-clockwise by `angle` radians around the origin.
pub fn rotate(p: Point2, angle: f64) -> Point2 {
    let (sin, cos) = angle.sin_cos();
    Point2::new(p.x * cos - p.y * sin, p.x * sin + p.y * cos)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub zoom: f64,
    /// Radians, unwrapped.
    pub rotation: f64,
    pub offset: Point2,
}

impl ViewTransform {
    pub fn new(zoom: f64, rotation: f64, offset: Point2) -> Self {
        Self {
            zoom,
            rotation,
            offset,
        }
    }

    /// Plane units covered by one widget pixel, `None` if the view is unusable.
    pub fn units_per_pixel(&self, size: WidgetSize) -> Option<f64> {
        if size.is_degenerate() || !(self.zoom > 0.0) || !self.zoom.is_finite() {
            return None;
        }
        Some(2.0 / size.min_side() / self.zoom)
    }

    pub fn widget_to_fractal(&self, point: Point2, size: WidgetSize) -> Option<Point2> {
        let scale = self.units_per_pixel(size)?;
        let rel = point - size.center();
        let flipped = Point2::new(rel.x * scale, -rel.y * scale);
        Some(self.offset + rotate(flipped, self.rotation))
    }

    pub fn fractal_to_widget(&self, point: Point2, size: WidgetSize) -> Option<Point2> {
        let scale = self.units_per_pixel(size)?;
        let local = rotate(point - self.offset, -self.rotation);
        Some(size.center() + Point2::new(local.x / scale, -local.y / scale))
    }

    /// The view with `zoom` and `rotation` whose offset keeps the plane point
    /// currently under `cursor` fixed on screen.
    pub fn anchored(
        &self,
        cursor: Point2,
        size: WidgetSize,
        zoom: f64,
        rotation: f64,
    ) -> Option<ViewTransform> {
        let target = self.widget_to_fractal(cursor, size)?;
        let moved = ViewTransform::new(zoom, rotation, Point2::ZERO).widget_to_fractal(cursor, size)?;
        Some(ViewTransform::new(zoom, rotation, target - moved))
    }
}

pub fn widget_to_fractal(
    point: Point2,
    size: WidgetSize,
    zoom: f64,
    rotation: f64,
    offset: Point2,
) -> Option<Point2> {
    ViewTransform::new(zoom, rotation, offset).widget_to_fractal(point, size)
}

pub fn fractal_to_widget(
    point: Point2,
    size: WidgetSize,
    zoom: f64,
    rotation: f64,
    offset: Point2,
) -> Option<Point2> {
    ViewTransform::new(zoom, rotation, offset).fractal_to_widget(point, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPSILON: f64 = 1e-9;

    fn assert_approx_eq(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPSILON,
            "actual={} expected={}",
            actual,
            expected
        );
    }

    fn assert_point_eq(actual: Point2, expected: Point2) {
        assert_approx_eq(actual.x, expected.x);
        assert_approx_eq(actual.y, expected.y);
    }

    const SQUARE: WidgetSize = WidgetSize::new(480.0, 480.0);

    #[test]
    fn centre_maps_to_offset() {
        let offset = Point2::new(-0.75, 0.1);
        let p = widget_to_fractal(SQUARE.center(), SQUARE, 3.0, 1.2, offset).unwrap();
        assert_point_eq(p, offset);
    }

    #[test]
    fn edges_span_two_over_zoom() {
        let right = widget_to_fractal(Point2::new(480.0, 240.0), SQUARE, 1.0, 0.0, Point2::ZERO)
            .unwrap();
        assert_point_eq(right, Point2::new(1.0, 0.0));
        let top = widget_to_fractal(Point2::new(240.0, 0.0), SQUARE, 2.0, 0.0, Point2::ZERO)
            .unwrap();
        assert_point_eq(top, Point2::new(0.0, 0.5));
    }

    #[test]
    fn shorter_side_sets_the_scale() {
        let wide = WidgetSize::new(800.0, 400.0);
        let p = widget_to_fractal(Point2::new(800.0, 200.0), wide, 1.0, 0.0, Point2::ZERO)
            .unwrap();
        assert_point_eq(p, Point2::new(2.0, 0.0));
    }

    #[test]
    fn quarter_turn_rotates_screen_right_to_plane_up() {
        let p = widget_to_fractal(Point2::new(480.0, 240.0), SQUARE, 1.0, FRAC_PI_2, Point2::ZERO)
            .unwrap();
        assert_point_eq(p, Point2::new(0.0, 1.0));
    }

    #[test]
    fn inverse_round_trips() {
        let sizes = [SQUARE, WidgetSize::new(1280.0, 720.0), WidgetSize::new(3.0, 977.0)];
        for size in sizes {
            for &zoom in &[1e-6, 0.37, 1.0, 12.5, 3.0e7] {
                for &rotation in &[-7.0, -PI, 0.0, 0.4, 2.0 * PI + 0.1] {
                    let offset = Point2::new(-0.7453, 0.1127);
                    let view = ViewTransform::new(zoom, rotation, offset);
                    let pixel = Point2::new(17.0, size.height - 5.0);
                    let plane = view.widget_to_fractal(pixel, size).unwrap();
                    let back = view.fractal_to_widget(plane, size).unwrap();
                    assert!((back - pixel).length() < 1e-6 * size.width.max(size.height));
                }
            }
        }
    }

    #[test]
    fn degenerate_inputs_yield_none() {
        let p = Point2::new(1.0, 1.0);
        assert!(widget_to_fractal(p, WidgetSize::new(0.0, 100.0), 1.0, 0.0, Point2::ZERO).is_none());
        assert!(widget_to_fractal(p, WidgetSize::new(100.0, 0.0), 1.0, 0.0, Point2::ZERO).is_none());
        assert!(widget_to_fractal(p, SQUARE, 0.0, 0.0, Point2::ZERO).is_none());
        assert!(fractal_to_widget(p, SQUARE, -1.0, 0.0, Point2::ZERO).is_none());
    }

    #[test]
    fn anchored_view_keeps_cursor_point() {
        let view = ViewTransform::new(1.5, 0.3, Point2::new(0.2, -0.4));
        let cursor = Point2::new(100.0, 333.0);
        let before = view.widget_to_fractal(cursor, SQUARE).unwrap();
        let zoomed = view.anchored(cursor, SQUARE, 4.0, 0.9).unwrap();
        let after = zoomed.widget_to_fractal(cursor, SQUARE).unwrap();
        assert_point_eq(after, before);
        assert_approx_eq(zoomed.zoom, 4.0);
    }
}
