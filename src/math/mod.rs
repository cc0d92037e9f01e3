//! Scalar, angle and line geometry helpers shared by the layout kernels.

pub mod angles;
pub mod bbox;
pub mod line;

pub use angles::{angle_avg, angle_diff, direction_between, rotate_around};
pub use bbox::{bbox_around, expand};
pub use line::{
    Intersection, IntersectType, closest_point_on_segment, closest_point_proportion,
    interpolate, interpolate_f64, line_intersection, line_length,
};
