//! Geometry core for railway track layout.
//!
//! The crate models a track network as alignments (ordered, contiguous
//! polyline segments with monotonic m-coordinates) and provides the
//! computation kernels built on top of that model:
//!
//! - [`editing`] — slicing, cutting and splicing alignment geometry,
//! - [`fitting`] — placing a switch template onto measured track geometry,
//! - [`linking`] — writing a fitted switch into track segment topology,
//! - [`geocoding`] — km-post based addressing along a reference line.
//!
//! All model types are immutable values; every edit produces new segments.

use serde::{Deserialize, Serialize};

pub mod editing;
pub mod error;
pub mod fitting;
pub mod geocoding;
pub mod linking;
pub mod math;
pub mod model;
pub mod prelude;

pub use error::Error;

/// Coordinate tolerance of the layout model. Segment endpoints closer
/// than this are the same location.
pub const LAYOUT_COORDINATE_DELTA: f64 = 0.001;

/// M-value tolerance of the layout model, in meters along an alignment.
pub const LAYOUT_M_DELTA: f64 = 0.001;

/// Identifier of a location track (a stored alignment with metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationTrackId(pub u64);

/// Identifier of a layout switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SwitchId(pub u64);

/// Identifier of the plan element a segment's geometry was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeometryElementId(pub u64);

impl std::fmt::Display for LocationTrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track:{}", self.0)
    }
}

impl std::fmt::Display for SwitchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "switch:{}", self.0)
    }
}

/// How a real-world location was measured. Carried through fitting
/// unchanged; the computations never invent accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationAccuracy {
    DesignedGeolocation,
    OfficiallyMeasuredGeodetically,
    MeasuredGeodetically,
    DigitizedAerialImage,
    GeometryCalculated,
}
