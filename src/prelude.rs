pub use crate::{LAYOUT_COORDINATE_DELTA, LAYOUT_M_DELTA};

// Re-export key components
pub use crate::editing::{
    AlignmentEnd, cut, extend_with_donor, replace_interval, slice_by_range,
};
pub use crate::fitting::{
    FitParams, FittedSwitch, FittedSwitchJoint, JointMatch, JointMatchType, SwitchFitRequest,
    fit_switch, fit_switch_from_joints, fit_switches,
};
pub use crate::geocoding::{
    AddressPoint, AlignmentAddresses, GeocodingContext, GeocodingIssue, GeocodingIssueType,
    KmNumber, KmPost, KmPostRejectedReason, TrackMeter, geocode_alignments,
    validate_address_points,
};
pub use crate::linking::{LinkParams, SwitchLinkingJoint, clear_links_to_switch, link_switch};
pub use crate::model::{
    Alignment, GeometrySource, JointNumber, LayoutSegment, SegmentPoint, SwitchStructure,
    SwitchTransform, calculate_switch_transform,
};

// Core identifier and classification types
pub use crate::Error;
pub use crate::GeometryElementId;
pub use crate::LocationAccuracy;
pub use crate::LocationTrackId;
pub use crate::SwitchId;
pub use crate::math::IntersectType;
