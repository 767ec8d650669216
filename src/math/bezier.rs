use super::{Point2d, Vector2d};
use cgmath::prelude::*;

/// A quadratic bezier curve
#[derive(Copy, Clone, Debug)]
pub struct QuadraticBezier2d {
    points: [Point2d; 3],
}

impl QuadraticBezier2d {
    pub const fn new(points: &[Point2d; 3]) -> Self {
        Self { points: *points }
    }

    /// The control point of the curve.
    pub const fn control(&self) -> Point2d {
        self.points[1]
    }

    /// Samples the curve at `t` in `[0, 1]`.
    pub fn sample(&self, t: f64) -> Point2d {
        let t1 = 1.0 - t;
        Point2d::from_vec(
            t1 * t1 * self.points[0].to_vec()
                + 2.0 * t1 * t * self.points[1].to_vec()
                + t * t * self.points[2].to_vec(),
        )
    }

    /// Samples the derivative of the curve at `t`.
    pub fn sample_dt(&self, t: f64) -> Vector2d {
        let t1 = 1.0 - t;
        -2.0 * t1 * self.points[0].to_vec()
            + (2.0 - 4.0 * t) * self.points[1].to_vec()
            + 2.0 * t * self.points[2].to_vec()
    }

    /// Approximates the arc length of the curve by sampling a polyline.
    pub fn polyline_length(&self, segments: usize) -> f64 {
        let step = 1.0 / segments as f64;
        let mut last = self.sample(0.0);
        let mut length = 0.0;
        for i in 1..=segments {
            let point = self.sample(i as f64 * step);
            length += (point - last).magnitude();
            last = point;
        }
        length
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn straight_curve_length_matches_chord() {
        let curve = QuadraticBezier2d::new(&[
            Point2d::new(0.0, 0.0),
            Point2d::new(50.0, 0.0),
            Point2d::new(100.0, 0.0),
        ]);
        assert_approx_eq!(curve.polyline_length(32), 100.0, 1e-9);
    }

    #[test]
    fn bowed_curve_is_longer_than_chord() {
        let curve = QuadraticBezier2d::new(&[
            Point2d::new(0.0, 0.0),
            Point2d::new(50.0, 30.0),
            Point2d::new(100.0, 0.0),
        ]);
        let length = curve.polyline_length(64);
        assert!(length > 100.0);
        assert!(length < 140.0);
    }

    #[test]
    fn endpoints_are_fixed() {
        let curve = QuadraticBezier2d::new(&[
            Point2d::new(3.0, 4.0),
            Point2d::new(9.0, -2.0),
            Point2d::new(12.0, 8.0),
        ]);
        assert_approx_eq!(curve.sample(0.0).x, 3.0);
        assert_approx_eq!(curve.sample(1.0).y, 8.0);
    }
}
