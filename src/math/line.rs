//! Point-to-line projections and line intersections.

use geo::Point;
use serde::{Deserialize, Serialize};

/// Euclidean distance between two points.
pub fn line_length(a: Point<f64>, b: Point<f64>) -> f64 {
    (b.x() - a.x()).hypot(b.y() - a.y())
}

/// Linear interpolation between two scalars at proportion `t`.
pub fn interpolate_f64(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Linear interpolation between two points at proportion `t`.
pub fn interpolate(a: Point<f64>, b: Point<f64>, t: f64) -> Point<f64> {
    Point::new(
        interpolate_f64(a.x(), b.x(), t),
        interpolate_f64(a.y(), b.y(), t),
    )
}

/// Proportion (unclamped) of the projection of `target` onto the line
/// through `start` and `end`: 0 at `start`, 1 at `end`.
pub fn closest_point_proportion(start: Point<f64>, end: Point<f64>, target: Point<f64>) -> f64 {
    let dx = end.x() - start.x();
    let dy = end.y() - start.y();
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return 0.0;
    }
    ((target.x() - start.x()) * dx + (target.y() - start.y()) * dy) / len_sq
}

/// Closest point to `target` on the closed segment `start..end`.
pub fn closest_point_on_segment(
    start: Point<f64>,
    end: Point<f64>,
    target: Point<f64>,
) -> Point<f64> {
    let t = closest_point_proportion(start, end, target).clamp(0.0, 1.0);
    interpolate(start, end, t)
}

/// Where an intersection (or a projection) lands relative to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntersectType {
    Before,
    Within,
    After,
}

impl IntersectType {
    pub fn of_proportion(t: f64) -> Self {
        if t < 0.0 {
            IntersectType::Before
        } else if t > 1.0 {
            IntersectType::After
        } else {
            IntersectType::Within
        }
    }
}

/// Intersection of the infinite lines through two segments, with the
/// intersection's proportion along each segment.
#[derive(Debug, Clone, Copy)]
pub struct Intersection {
    pub point: Point<f64>,
    pub segment_1_proportion: f64,
    pub segment_2_proportion: f64,
}

impl Intersection {
    pub fn in_segment_1(&self) -> IntersectType {
        IntersectType::of_proportion(self.segment_1_proportion)
    }

    pub fn in_segment_2(&self) -> IntersectType {
        IntersectType::of_proportion(self.segment_2_proportion)
    }
}

/// Intersects the infinite lines through `a1..a2` and `b1..b2`.
/// Returns `None` for (near-)parallel lines.
pub fn line_intersection(
    a1: Point<f64>,
    a2: Point<f64>,
    b1: Point<f64>,
    b2: Point<f64>,
) -> Option<Intersection> {
    let rx = a2.x() - a1.x();
    let ry = a2.y() - a1.y();
    let sx = b2.x() - b1.x();
    let sy = b2.y() - b1.y();

    let denominator = rx * sy - ry * sx;
    if denominator.abs() < 1e-12 {
        return None;
    }

    let qpx = b1.x() - a1.x();
    let qpy = b1.y() - a1.y();
    let t = (qpx * sy - qpy * sx) / denominator;
    let u = (qpx * ry - qpy * rx) / denominator;

    Some(Intersection {
        point: Point::new(a1.x() + t * rx, a1.y() + t * ry),
        segment_1_proportion: t,
        segment_2_proportion: u,
    })
}
