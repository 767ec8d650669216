use crate::math::{rot90, Point2d, QuadraticBezier2d};

/// Polyline resolution used to measure curve length.
const LENGTH_SAMPLES: usize = 32;

/// Floor on the usable curve length; keeps following-distance arithmetic
/// meaningful on very short chords.
const MIN_CURVE_LENGTH: f64 = 50.0;

/// Largest lateral bow as a fraction of the chord length.
const MAX_BOW: f64 = 0.22;

/// The rendered geometry of a directed edge: a quadratic bezier between
/// the endpoints, bowed sideways by a deterministic per-edge offset.
///
/// Vehicle progress is measured along this curve, not the chord, so the
/// engine keeps the polyline-sampled true length.
pub struct EdgeCurve {
    bezier: QuadraticBezier2d,
    offset: f64,
    length: f64,
}

impl EdgeCurve {
    /// Builds the curve for the edge `from -> to`.
    pub fn between(from_name: &str, to_name: &str, from: Point2d, to: Point2d) -> Self {
        let offset = curve_offset(from_name, to_name);
        let chord = to - from;
        let mid = from + chord * 0.5;
        let control = mid + rot90(chord) * offset;
        let bezier = QuadraticBezier2d::new(&[from, control, to]);
        let length = bezier.polyline_length(LENGTH_SAMPLES).max(MIN_CURVE_LENGTH);
        Self {
            bezier,
            offset,
            length,
        }
    }

    /// True curve length in length units.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The lateral bow as a signed fraction of the chord.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Samples the curve at fractional progress `t` in `[0, 1]`.
    pub fn sample(&self, t: f64) -> Point2d {
        self.bezier.sample(t)
    }
}

/// Deterministic lateral bow for an edge, derived from its endpoint names
/// with FNV-1a so the engine and rendering clients agree on geometry
/// without coordination. Reversed name pairs hash differently, giving the
/// two directions of a road distinct curves.
pub fn curve_offset(from_name: &str, to_name: &str) -> f64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in from_name.bytes().chain([0x1f]).chain(to_name.bytes()) {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    ((hash % 1000) as f64 / 1000.0 - 0.5) * 2.0 * MAX_BOW
}
