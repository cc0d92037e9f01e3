//! Polyline vertices with segment-local m-values.

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::LAYOUT_COORDINATE_DELTA;
use crate::math::{interpolate_f64, line_length};

/// A vertex of a segment polyline. `m` is the distance along the segment
/// from its first point, so the first point always has `m == 0.0` and the
/// values increase strictly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentPoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: f64,
}

impl SegmentPoint {
    pub fn new(x: f64, y: f64, z: Option<f64>, m: f64) -> Self {
        Self { x, y, z, m }
    }

    pub fn to_point(self) -> Point<f64> {
        Point::new(self.x, self.y)
    }

    pub fn distance_to(&self, other: &SegmentPoint) -> f64 {
        line_length(self.to_point(), other.to_point())
    }

    /// Whether two points are the same location within layout tolerance.
    pub fn is_same(&self, other: &SegmentPoint) -> bool {
        (self.x - other.x).abs() <= LAYOUT_COORDINATE_DELTA
            && (self.y - other.y).abs() <= LAYOUT_COORDINATE_DELTA
    }

    /// Point at proportion `t` between `self` and `other`. Heights are
    /// interpolated only when both ends have one.
    pub fn interpolate_to(&self, other: &SegmentPoint, t: f64) -> SegmentPoint {
        let z = match (self.z, other.z) {
            (Some(a), Some(b)) => Some(interpolate_f64(a, b, t)),
            _ => None,
        };
        SegmentPoint {
            x: interpolate_f64(self.x, other.x, t),
            y: interpolate_f64(self.y, other.y, t),
            z,
            m: interpolate_f64(self.m, other.m, t),
        }
    }

    /// Same point with a new m-value.
    pub fn with_m(self, m: f64) -> SegmentPoint {
        SegmentPoint { m, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn interpolation_covers_coordinates_and_m() {
        let a = SegmentPoint::new(0.0, 0.0, Some(10.0), 0.0);
        let b = SegmentPoint::new(4.0, 2.0, Some(12.0), 5.0);
        let mid = a.interpolate_to(&b, 0.5);
        assert_abs_diff_eq!(mid.x, 2.0);
        assert_abs_diff_eq!(mid.y, 1.0);
        assert_abs_diff_eq!(mid.z.unwrap(), 11.0);
        assert_abs_diff_eq!(mid.m, 2.5);
    }

    #[test]
    fn missing_height_is_not_invented() {
        let a = SegmentPoint::new(0.0, 0.0, Some(10.0), 0.0);
        let b = SegmentPoint::new(4.0, 0.0, None, 4.0);
        assert!(a.interpolate_to(&b, 0.5).z.is_none());
    }

    #[test]
    fn same_location_within_tolerance() {
        let a = SegmentPoint::new(1.0, 1.0, None, 0.0);
        let b = SegmentPoint::new(1.0005, 0.9995, None, 3.0);
        assert!(a.is_same(&b));
        assert!(!a.is_same(&SegmentPoint::new(1.01, 1.0, None, 0.0)));
    }
}
