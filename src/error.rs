use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Segment geometry needs at least two points, got {0}")]
    TooFewPoints(usize),
    #[error("Segment point coordinates must be finite")]
    NonFiniteCoordinate,
    #[error("Segment m-values must start at zero and increase strictly")]
    NonMonotonicM,
    #[error("M-range {min}..{max} is empty or inverted")]
    EmptyRange { min: f64, max: f64 },
    #[error("M-range {min}..{max} is outside alignment range 0..{length}")]
    RangeOutOfAlignment { min: f64, max: f64, length: f64 },
    #[error("Slice produced no geometry")]
    EmptySlice,
    #[error("Geocoding error: {0}")]
    GeocodingError(String),
    #[error("Km posts are not in ascending order along the reference line: {0}")]
    KmPostsOutOfOrder(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
