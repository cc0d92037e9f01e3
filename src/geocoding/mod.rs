//! Km-post geocoding: addresses along a reference line.
//!
//! A [`GeocodingContext`] is built from a reference line's geometry and
//! the km posts along it, each post projected perpendicularly onto the
//! line. Once built, it converts between layout coordinates and track
//! addresses in both directions and produces whole-meter address points
//! for any alignment by intersecting projection lines with its geometry.

pub mod track_meter;

use geo::Point;
use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::{
    IntersectType, angle_diff, direction_between, interpolate, interpolate_f64, line_intersection,
    line_length,
};
use crate::model::{Alignment, SegmentPoint};
use crate::{Error, LAYOUT_M_DELTA, LocationTrackId};

pub use track_meter::{KmNumber, TrackMeter};

/// Half-length of the perpendicular projection lines used to carry
/// addresses from the reference line onto other alignments.
pub const PROJECTION_LINE_LENGTH: f64 = 100.0;

/// A projected address step may deviate from the target alignment's own
/// direction by this much before the section counts as stretched.
pub const STRETCHED_DIRECTION_LIMIT: f64 = std::f64::consts::PI / 16.0;

/// Direction change between consecutive address steps above this is a
/// sharp angle.
pub const SHARP_ANGLE_LIMIT: f64 = std::f64::consts::FRAC_PI_2;

/// A kilometer post as surveyed: the km number and its measured
/// location, if it has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KmPost {
    pub km_number: KmNumber,
    pub location: Option<Point<f64>>,
}

/// Why a km post was left out of a geocoding context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KmPostRejectedReason {
    NoLocation,
    IsBeforeStartAddress,
    Duplicate,
    IntersectsBeforeReferenceLine,
    IntersectsAfterReferenceLine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedKmPost {
    pub km_post: KmPost,
    pub reason: KmPostRejectedReason,
}

/// A km post projected onto the reference line, anchoring the addresses
/// of one kilometer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodingReferencePoint {
    pub km_number: KmNumber,
    /// Meters value of the address at this point.
    pub meters: f64,
    /// Distance of the projection along the reference line.
    pub distance: f64,
    /// Distance from the surveyed post location to its projection.
    pub km_post_offset: f64,
    pub intersect_type: IntersectType,
}

/// An address resolved onto a specific alignment location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPoint {
    /// The location on the target alignment; `m` is the alignment-m.
    pub point: SegmentPoint,
    pub address: TrackMeter,
}

/// Whole-meter address points of one alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentAddresses {
    pub start_point: AddressPoint,
    pub end_point: AddressPoint,
    pub start_intersect: IntersectType,
    pub end_intersect: IntersectType,
    pub mid_points: Vec<AddressPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeocodingIssueType {
    StretchedMeters,
    SharpAngle,
}

/// A quality finding about projected address points. Findings are
/// results, not errors: the addresses are still produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodingIssue {
    pub issue_type: GeocodingIssueType,
    pub range: (TrackMeter, TrackMeter),
}

#[derive(Debug, Clone)]
pub struct GeocodingContextCreateResult {
    pub context: GeocodingContext,
    pub rejected_km_posts: Vec<RejectedKmPost>,
}

/// Addressing of one track number: the reference line geometry and the
/// accepted km posts projected onto it. Immutable after creation.
#[derive(Debug, Clone)]
pub struct GeocodingContext {
    track_number: String,
    start_address: TrackMeter,
    reference_geometry: Alignment,
    reference_points: Vec<GeocodingReferencePoint>,
}

impl GeocodingContext {
    /// Builds a context, classifying unusable km posts instead of
    /// failing on them. Posts whose projections are not strictly
    /// ascending along the line make the whole build fail.
    pub fn create(
        track_number: impl Into<String>,
        start_address: TrackMeter,
        reference_geometry: Alignment,
        km_posts: &[KmPost],
    ) -> Result<GeocodingContextCreateResult, Error> {
        let track_number = track_number.into();
        let mut rejected = Vec::new();
        let mut accepted: Vec<(KmPost, Point<f64>)> = Vec::new();

        for post in km_posts {
            let Some(location) = post.location else {
                rejected.push(RejectedKmPost {
                    km_post: post.clone(),
                    reason: KmPostRejectedReason::NoLocation,
                });
                continue;
            };
            let reason = if post.km_number <= start_address.km_number {
                Some(KmPostRejectedReason::IsBeforeStartAddress)
            } else if accepted.iter().any(|(p, _)| p.km_number == post.km_number) {
                Some(KmPostRejectedReason::Duplicate)
            } else {
                None
            };
            match reason {
                Some(reason) => rejected.push(RejectedKmPost {
                    km_post: post.clone(),
                    reason,
                }),
                None => accepted.push((post.clone(), location)),
            }
        }
        accepted.sort_by(|(a, _), (b, _)| a.km_number.cmp(&b.km_number));

        let mut reference_points = vec![GeocodingReferencePoint {
            km_number: start_address.km_number.clone(),
            meters: start_address.meters,
            distance: 0.0,
            km_post_offset: 0.0,
            intersect_type: IntersectType::Within,
        }];
        for (post, location) in accepted {
            let (distance, intersect) = reference_geometry.closest_point_m(location);
            match intersect {
                IntersectType::Before => rejected.push(RejectedKmPost {
                    km_post: post,
                    reason: KmPostRejectedReason::IntersectsBeforeReferenceLine,
                }),
                IntersectType::After => rejected.push(RejectedKmPost {
                    km_post: post,
                    reason: KmPostRejectedReason::IntersectsAfterReferenceLine,
                }),
                IntersectType::Within => {
                    let projection = reference_geometry
                        .point_at_m(distance)
                        .ok_or_else(|| Error::GeocodingError("projection outside geometry".into()))?;
                    reference_points.push(GeocodingReferencePoint {
                        km_number: post.km_number.clone(),
                        meters: 0.0,
                        distance,
                        km_post_offset: line_length(projection.to_point(), location),
                        intersect_type: intersect,
                    });
                }
            }
        }

        for pair in reference_points.windows(2) {
            if pair[1].distance <= pair[0].distance {
                return Err(Error::KmPostsOutOfOrder(format!(
                    "track number {track_number}: km {} at {:.3} m, km {} at {:.3} m",
                    pair[0].km_number, pair[0].distance, pair[1].km_number, pair[1].distance,
                )));
            }
        }
        for post in &rejected {
            warn!(
                "km post {} on track number {track_number} left out of geocoding: {:?}",
                post.km_post.km_number, post.reason
            );
        }

        Ok(GeocodingContextCreateResult {
            context: GeocodingContext {
                track_number,
                start_address,
                reference_geometry,
                reference_points,
            },
            rejected_km_posts: rejected,
        })
    }

    pub fn track_number(&self) -> &str {
        &self.track_number
    }

    pub fn start_address(&self) -> &TrackMeter {
        &self.start_address
    }

    pub fn reference_points(&self) -> &[GeocodingReferencePoint] {
        &self.reference_points
    }

    pub fn reference_geometry(&self) -> &Alignment {
        &self.reference_geometry
    }

    /// Address of an arbitrary location, with a classification of
    /// whether it projects before or after the reference line.
    pub fn get_address(&self, location: Point<f64>) -> Option<(TrackMeter, IntersectType)> {
        self.get_address_and_m(location)
            .map(|(address, _, intersect)| (address, intersect))
    }

    /// Like [`get_address`](Self::get_address), also returning the
    /// distance of the projection along the reference line.
    pub fn get_address_and_m(
        &self,
        location: Point<f64>,
    ) -> Option<(TrackMeter, f64, IntersectType)> {
        let (m, intersect) = self.reference_geometry.closest_point_m(location);
        let address = self.get_address_at_distance(m)?;
        Some((address, m, intersect))
    }

    /// Address at a distance along the reference line.
    pub fn get_address_at_distance(&self, distance: f64) -> Option<TrackMeter> {
        if distance < -LAYOUT_M_DELTA
            || distance > self.reference_geometry.length() + LAYOUT_M_DELTA
        {
            return None;
        }
        let i = self
            .reference_points
            .partition_point(|p| p.distance <= distance)
            .saturating_sub(1);
        let reference = &self.reference_points[i];
        Some(TrackMeter::new(
            reference.km_number.clone(),
            reference.meters + (distance - reference.distance).max(0.0),
        ))
    }

    /// Location of an address on the reference line, `None` when the
    /// address falls outside it.
    pub fn get_point_at_address(&self, address: &TrackMeter) -> Option<SegmentPoint> {
        let distance = self.get_distance_at_address(address)?;
        self.reference_geometry.point_at_m(distance)
    }

    fn get_distance_at_address(&self, address: &TrackMeter) -> Option<f64> {
        let i = self
            .reference_points
            .partition_point(|p| p.km_number <= address.km_number)
            .checked_sub(1)?;
        let reference = &self.reference_points[i];
        if reference.km_number != address.km_number {
            return None;
        }
        let distance = reference.distance + (address.meters - reference.meters);
        (-LAYOUT_M_DELTA..=self.reference_geometry.length() + LAYOUT_M_DELTA)
            .contains(&distance)
            .then_some(distance.clamp(0.0, self.reference_geometry.length()))
    }

    /// Start, end and whole-meter address points of `alignment`,
    /// obtained by intersecting perpendicular projection lines from the
    /// reference line with the alignment's geometry. `None` when the
    /// alignment cannot be addressed by this context at all.
    pub fn get_address_points(&self, alignment: &Alignment) -> Option<AlignmentAddresses> {
        let start = alignment.start_point();
        let end = alignment.end_point();
        let (start_address, start_distance, start_intersect) =
            self.get_address_and_m(start.to_point())?;
        let (end_address, end_distance, end_intersect) =
            self.get_address_and_m(end.to_point())?;
        if end_distance <= start_distance {
            return None;
        }

        let mid_points = self.project_whole_meters(alignment, start_distance, end_distance);
        Some(AlignmentAddresses {
            start_point: AddressPoint {
                point: start,
                address: start_address,
            },
            end_point: AddressPoint {
                point: end.with_m(alignment.length()),
                address: end_address,
            },
            start_intersect,
            end_intersect,
            mid_points,
        })
    }

    /// Whole-meter projection targets strictly inside the reference
    /// distance range, walked along the alignment's edges.
    fn project_whole_meters(
        &self,
        alignment: &Alignment,
        start_distance: f64,
        end_distance: f64,
    ) -> Vec<AddressPoint> {
        let edges = alignment_edges(alignment);
        let mut points = Vec::new();
        let mut cursor = 0;
        for (address, distance) in self.whole_meter_targets(start_distance, end_distance) {
            let Some(origin) = self.reference_geometry.point_at_m(distance) else {
                continue;
            };
            let Some(direction) = self.reference_geometry.direction_at_m(distance) else {
                continue;
            };
            // Perpendicular projection line across the reference line
            let normal = direction + std::f64::consts::FRAC_PI_2;
            let o = origin.to_point();
            let line_start = Point::new(
                o.x() - normal.cos() * PROJECTION_LINE_LENGTH,
                o.y() - normal.sin() * PROJECTION_LINE_LENGTH,
            );
            let line_end = Point::new(
                o.x() + normal.cos() * PROJECTION_LINE_LENGTH,
                o.y() + normal.sin() * PROJECTION_LINE_LENGTH,
            );

            while cursor < edges.len() {
                let edge = &edges[cursor];
                let Some(intersection) =
                    line_intersection(line_start, line_end, edge.start, edge.end)
                else {
                    // Projection line parallel to the edge
                    cursor += 1;
                    continue;
                };
                match intersection.in_segment_2() {
                    IntersectType::After => {
                        cursor += 1;
                    }
                    IntersectType::Before => {
                        // The alignment bends back relative to the
                        // reference line; this meter has no point.
                        break;
                    }
                    IntersectType::Within => {
                        if intersection.in_segment_1() == IntersectType::Within {
                            let t = intersection.segment_2_proportion;
                            let location = interpolate(edge.start, edge.end, t);
                            let m = interpolate_f64(edge.start_m, edge.end_m, t);
                            points.push(AddressPoint {
                                point: SegmentPoint::new(location.x(), location.y(), None, m),
                                address,
                            });
                        }
                        break;
                    }
                }
            }
        }
        points
    }

    /// Whole-meter addresses with their reference line distances, in
    /// ascending order strictly inside `(start_distance, end_distance)`.
    fn whole_meter_targets(
        &self,
        start_distance: f64,
        end_distance: f64,
    ) -> Vec<(TrackMeter, f64)> {
        let line_end = self.reference_geometry.length().min(end_distance);
        let mut targets = Vec::new();
        for (i, reference) in self.reference_points.iter().enumerate() {
            let interval_end = self
                .reference_points
                .get(i + 1)
                .map_or(line_end, |next| next.distance.min(line_end));
            let mut meters = reference.meters.ceil();
            // The start address itself never gets a point; a km post's
            // meter zero does.
            if i == 0 && meters <= reference.meters {
                meters += 1.0;
            }
            loop {
                let distance = reference.distance + (meters - reference.meters);
                if distance >= interval_end {
                    break;
                }
                if distance > start_distance {
                    targets.push((
                        TrackMeter::new(reference.km_number.clone(), meters),
                        distance,
                    ));
                }
                meters += 1.0;
            }
        }
        targets
    }
}

struct AlignmentEdge {
    start: Point<f64>,
    end: Point<f64>,
    start_m: f64,
    end_m: f64,
}

fn alignment_edges(alignment: &Alignment) -> Vec<AlignmentEdge> {
    let mut edges = Vec::new();
    for segment in alignment.segments() {
        for pair in segment.points().windows(2) {
            edges.push(AlignmentEdge {
                start: pair[0].to_point(),
                end: pair[1].to_point(),
                start_m: segment.start_m + pair[0].m,
                end_m: segment.start_m + pair[1].m,
            });
        }
    }
    edges
}

/// Flags stretched and sharp-angle sections of projected address
/// points. Contiguous flagged steps merge into one range per issue.
pub fn validate_address_points(
    alignment: &Alignment,
    addresses: &AlignmentAddresses,
) -> Vec<GeocodingIssue> {
    let mut sequence: Vec<&AddressPoint> = Vec::with_capacity(addresses.mid_points.len() + 2);
    sequence.push(&addresses.start_point);
    sequence.extend(addresses.mid_points.iter());
    sequence.push(&addresses.end_point);

    let mut stretched: Vec<(TrackMeter, TrackMeter)> = Vec::new();
    let mut sharp: Vec<(TrackMeter, TrackMeter)> = Vec::new();
    let mut previous_step: Option<f64> = None;
    for pair in sequence.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let step = direction_between(from.point.to_point(), to.point.to_point());
        let mid_m = (from.point.m + to.point.m) / 2.0;
        if let Some(source) = alignment.direction_at_m(mid_m) {
            if angle_diff(step, source) > STRETCHED_DIRECTION_LIMIT {
                push_range(&mut stretched, from.address.clone(), to.address.clone());
            }
        }
        if let Some(previous) = previous_step {
            if angle_diff(previous, step) > SHARP_ANGLE_LIMIT {
                push_range(&mut sharp, from.address.clone(), to.address.clone());
            }
        }
        previous_step = Some(step);
    }

    let mut issues: Vec<GeocodingIssue> = stretched
        .into_iter()
        .map(|range| GeocodingIssue {
            issue_type: GeocodingIssueType::StretchedMeters,
            range,
        })
        .chain(sharp.into_iter().map(|range| GeocodingIssue {
            issue_type: GeocodingIssueType::SharpAngle,
            range,
        }))
        .collect();
    issues.sort_by(|a, b| a.range.0.cmp(&b.range.0));
    for issue in &issues {
        warn!(
            "address points {}..{} are {:?}",
            issue.range.0, issue.range.1, issue.issue_type
        );
    }
    issues
}

/// Extends the last range when the new one continues it, otherwise
/// starts a new range.
fn push_range(ranges: &mut Vec<(TrackMeter, TrackMeter)>, from: TrackMeter, to: TrackMeter) {
    if let Some(last) = ranges.last_mut() {
        if last.1 >= from {
            last.1 = to;
            return;
        }
    }
    ranges.push((from, to));
}

/// Geocodes many alignments in parallel, keyed by track id.
pub fn geocode_alignments(
    context: &GeocodingContext,
    alignments: &[(LocationTrackId, &Alignment)],
) -> Vec<(LocationTrackId, Option<AlignmentAddresses>)> {
    alignments
        .par_iter()
        .map(|(track_id, alignment)| (*track_id, context.get_address_points(alignment)))
        .collect()
}
