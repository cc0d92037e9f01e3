//! Angle arithmetic on the unit circle. Directions are radians in
//! `(-PI, PI]` as returned by `atan2`.

use geo::Point;
use std::f64::consts::PI;

/// Direction of the vector `from -> to`.
pub fn direction_between(from: Point<f64>, to: Point<f64>) -> f64 {
    (to.y() - from.y()).atan2(to.x() - from.x())
}

/// Smallest absolute difference between two directions, in `[0, PI]`.
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(2.0 * PI);
    if diff > PI { 2.0 * PI - diff } else { diff }
}

/// Circular average of two directions, on the short arc between them.
pub fn angle_avg(a: f64, b: f64) -> f64 {
    let diff = (b - a).rem_euclid(2.0 * PI);
    let half = if diff > PI { diff - 2.0 * PI } else { diff } / 2.0;
    let avg = a + half;
    if avg > PI {
        avg - 2.0 * PI
    } else if avg <= -PI {
        avg + 2.0 * PI
    } else {
        avg
    }
}

/// Rotates `point` by `angle` radians around `origin`.
pub fn rotate_around(point: Point<f64>, angle: f64, origin: Point<f64>) -> Point<f64> {
    let (sin, cos) = angle.sin_cos();
    let dx = point.x() - origin.x();
    let dy = point.y() - origin.y();
    Point::new(
        origin.x() + dx * cos - dy * sin,
        origin.y() + dx * sin + dy * cos,
    )
}
