use bevy::math::Vec2;
use svg::node::element::path::Data;
use svg::node::element::Path;
use svg::node::Value;

use crate::constants::SVG_CIRCLE_RADIUS;
use crate::model::LineColor;

/// Where the end point lies relative to the start point, in screen coordinates
/// (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    LowerRight,
    UpperRight,
    LowerLeft,
    UpperLeft,
}

impl Quadrant {
    pub fn of(start: Vec2, end: Vec2) -> Self {
        match (end.x >= start.x, end.y >= start.y) {
            (true, true) => Quadrant::LowerRight,
            (true, false) => Quadrant::UpperRight,
            (false, true) => Quadrant::LowerLeft,
            (false, false) => Quadrant::UpperLeft,
        }
    }

    pub fn is_backward(self) -> bool {
        matches!(self, Quadrant::LowerLeft | Quadrant::UpperLeft)
    }
}

/// Cubic curve from a response's outgoing connector to a conversation's incoming one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicConnector {
    pub start: Vec2,
    pub control1: Vec2,
    pub control2: Vec2,
    pub end: Vec2,
}

impl CubicConnector {
    /// Smallest horizontal bow for a connector that runs right to left.
    pub const MIN_BACKWARD_BOW: f32 = 80.0;

    pub fn between(start: Vec2, end: Vec2) -> Self {
        let mid = (start + end) / 2.0;
        let half = (end - start).abs() / 2.0;
        let bow = half.x + half.x.max(Self::MIN_BACKWARD_BOW);

        // Forward curves leave and arrive horizontally; backward ones loop out past both ends.
        let (control1, control2) = match Quadrant::of(start, end) {
            Quadrant::LowerRight => (mid + Vec2::new(0.0, -half.y), mid + Vec2::new(0.0, half.y)),
            Quadrant::UpperRight => (mid + Vec2::new(0.0, half.y), mid + Vec2::new(0.0, -half.y)),
            Quadrant::LowerLeft => (mid + Vec2::new(bow, -half.y), mid + Vec2::new(-bow, half.y)),
            Quadrant::UpperLeft => (mid + Vec2::new(bow, half.y), mid + Vec2::new(-bow, -half.y)),
        };

        Self {
            start,
            control1,
            control2,
            end,
        }
    }

    pub fn quadrant(&self) -> Quadrant {
        Quadrant::of(self.start, self.end)
    }

    pub fn points(&self) -> [Vec2; 4] {
        [self.start, self.control1, self.control2, self.end]
    }

    pub fn point_at(&self, t: f32) -> Vec2 {
        let u = 1.0 - t;
        self.start * (u * u * u)
            + self.control1 * (3.0 * u * u * t)
            + self.control2 * (3.0 * u * t * t)
            + self.end * (t * t * t)
    }

    /// Top-left corner of the weight/points marker drawn on the middle of the curve.
    pub fn setting_anchor(&self) -> Vec2 {
        self.point_at(0.5) - Vec2::splat(SVG_CIRCLE_RADIUS)
    }

    pub fn data(&self) -> Data {
        Data::new()
            .move_to((self.start.x, self.start.y))
            .cubic_curve_to((
                self.control1.x,
                self.control1.y,
                self.control2.x,
                self.control2.y,
                self.end.x,
                self.end.y,
            ))
    }

    /// Value of the `d` attribute.
    pub fn path_data(&self) -> String {
        Value::from(self.data()).to_string()
    }

    pub fn to_svg_path(&self, id: &str, color: LineColor) -> Path {
        Path::new()
            .set("id", id)
            .set("d", self.data())
            .set("fill", "none")
            .set("stroke", color.to_string())
            .set("stroke-width", 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quadrants_follow_screen_axes() {
        let origin = Vec2::new(100.0, 100.0);
        assert_eq!(Quadrant::of(origin, Vec2::new(200.0, 300.0)), Quadrant::LowerRight);
        assert_eq!(Quadrant::of(origin, Vec2::new(200.0, 0.0)), Quadrant::UpperRight);
        assert_eq!(Quadrant::of(origin, Vec2::new(0.0, 300.0)), Quadrant::LowerLeft);
        assert_eq!(Quadrant::of(origin, Vec2::new(0.0, 0.0)), Quadrant::UpperLeft);
    }

    #[test]
    fn forward_curve_leaves_horizontally() {
        let curve = CubicConnector::between(Vec2::new(0.0, 0.0), Vec2::new(200.0, 100.0));
        assert_relative_eq!(curve.control1.x, 100.0);
        assert_relative_eq!(curve.control1.y, 0.0);
        assert_relative_eq!(curve.control2.x, 100.0);
        assert_relative_eq!(curve.control2.y, 100.0);
    }

    #[test]
    fn backward_curve_bows_past_both_ends() {
        let start = Vec2::new(300.0, 50.0);
        let end = Vec2::new(100.0, 250.0);
        let curve = CubicConnector::between(start, end);
        assert!(curve.quadrant().is_backward());
        assert!(curve.control1.x > start.x);
        assert!(curve.control2.x < end.x);
        assert_relative_eq!(curve.control1.y, start.y);
        assert_relative_eq!(curve.control2.y, end.y);
    }

    #[test]
    fn short_backward_curve_uses_minimum_bow() {
        let curve = CubicConnector::between(Vec2::new(110.0, 0.0), Vec2::new(100.0, 0.0));
        assert_relative_eq!(curve.control1.x, 110.0 + CubicConnector::MIN_BACKWARD_BOW);
    }

    #[test]
    fn setting_anchor_sits_on_midpoint() {
        let curve = CubicConnector::between(Vec2::new(0.0, 0.0), Vec2::new(200.0, 100.0));
        let anchor = curve.setting_anchor();
        assert_relative_eq!(anchor.x, 100.0 - SVG_CIRCLE_RADIUS, epsilon = 1e-4);
        assert_relative_eq!(anchor.y, 50.0 - SVG_CIRCLE_RADIUS, epsilon = 1e-4);
    }

    #[test]
    fn path_data_is_move_then_curve() {
        let curve = CubicConnector::between(Vec2::new(0.0, 0.0), Vec2::new(200.0, 100.0));
        let data = curve.path_data();
        assert!(data.starts_with('M'));
        assert!(data.contains('C'));
    }
}
