//! Track layout geometry model.
//!
//! Types here are immutable values: every edit produces new segments and
//! alignments, the originals are never mutated in place.

pub mod alignment;
pub mod point;
pub mod segment;
pub mod switch;

pub use alignment::Alignment;
pub use point::SegmentPoint;
pub use segment::{GeometrySource, LayoutSegment, SegmentPointSeek};
pub use switch::{
    JointNumber, SwitchAlignment, SwitchElement, SwitchElementType, SwitchJoint, SwitchStructure,
    SwitchTransform, calculate_switch_transform,
};
