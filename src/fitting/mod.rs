//! Switch fitting: placing a switch structure onto measured track
//! geometry.
//!
//! Fitting infers a rigid transform from a hint location and the local
//! track tangent, projects the structure's canonical joints into layout
//! coordinates through it, and matches every projected joint against the
//! nearby track geometry. Several candidate transforms are tried (both
//! travel directions, every structure alignment through the anchor
//! joint); the one whose joints land closest to real geometry wins.

use geo::Point;
use rayon::prelude::*;
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};

use crate::math::{closest_point_proportion, interpolate, interpolate_f64, line_length};
use crate::model::{
    Alignment, JointNumber, SwitchStructure, calculate_switch_transform,
};
use crate::{LocationAccuracy, LocationTrackId, SwitchId};

/// Default snap distance for matching a joint to a segment endpoint.
pub const JOINT_ENDPOINT_SNAP_DISTANCE: f64 = 0.5;

/// Default tolerance for matching a joint to a position along a segment.
pub const JOINT_MATCH_TOLERANCE: f64 = 0.2;

/// Tracks further than this from the hint point are not considered.
const HINT_MAX_TRACK_DISTANCE: f64 = 1.0;

/// Tolerances of the fitter.
#[derive(Debug, Clone, Copy)]
pub struct FitParams {
    pub endpoint_snap_distance: f64,
    pub match_tolerance: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            endpoint_snap_distance: JOINT_ENDPOINT_SNAP_DISTANCE,
            match_tolerance: JOINT_MATCH_TOLERANCE,
        }
    }
}

/// How a joint attached to track geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointMatchType {
    Start,
    End,
    Line,
}

/// A joint's attachment to one location track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointMatch {
    pub track_id: LocationTrackId,
    pub segment_index: usize,
    /// Alignment-m of the matched position on the track.
    pub m: f64,
    pub match_type: JointMatchType,
    /// Distance from the joint location to the matched position.
    pub distance: f64,
    /// Perpendicular distance from the joint location to the track.
    pub distance_to_alignment: f64,
}

/// A structure joint placed into layout coordinates, with its track
/// attachments (at most one per track, the best).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedSwitchJoint {
    pub number: JointNumber,
    pub location: Point<f64>,
    pub matches: Vec<JointMatch>,
    /// Accuracy of the source measurement, carried through unchanged.
    pub location_accuracy: Option<LocationAccuracy>,
}

/// Result of fitting: every alignment joint of the structure in layout
/// coordinates with its track matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedSwitch {
    pub joints: Vec<FittedSwitchJoint>,
}

impl FittedSwitch {
    pub fn joint(&self, number: JointNumber) -> Option<&FittedSwitchJoint> {
        self.joints.iter().find(|j| j.number == number)
    }

    fn score(&self) -> f64 {
        self.joints
            .iter()
            .filter_map(|joint| {
                joint
                    .matches
                    .iter()
                    .map(|m| m.distance_to_alignment)
                    .min_by(f64::total_cmp)
            })
            .map(|d| (1.0 - d).max(0.0))
            .sum()
    }

    fn match_count(&self) -> usize {
        self.joints.iter().filter(|j| !j.matches.is_empty()).count()
    }
}

/// One unit of bulk fitting work.
pub struct SwitchFitRequest<'a> {
    pub switch_id: SwitchId,
    pub hint: Point<f64>,
    pub structure: &'a SwitchStructure,
    pub location_accuracy: Option<LocationAccuracy>,
}

/// Fits a switch near `hint` onto the given tracks. `None` when no
/// transform candidate can be inferred or no projected joint attaches to
/// any track.
pub fn fit_switch(
    hint: Point<f64>,
    structure: &SwitchStructure,
    tracks: &[(LocationTrackId, &Alignment)],
    location_accuracy: Option<LocationAccuracy>,
    params: &FitParams,
) -> Option<FittedSwitch> {
    let anchor = anchor_joint(structure)?;
    let anchor_location = structure.joint_location(anchor)?;

    // Joints that can anchor the far end of the transform: on each
    // structure alignment through the anchor, the joint farthest from it.
    let far_anchors: Vec<(JointNumber, f64)> = structure
        .alignments()
        .iter()
        .filter(|a| a.joint_numbers.contains(&anchor))
        .filter_map(|a| {
            a.joint_numbers
                .iter()
                .filter(|&&n| n != anchor)
                .filter_map(|&n| {
                    structure
                        .joint_location(n)
                        .map(|loc| (n, line_length(anchor_location, loc)))
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
        })
        .collect();

    let mut best: Option<FittedSwitch> = None;
    for (_, alignment) in tracks {
        let (hint_m, _) = alignment.closest_point_m(hint);
        let Some(anchor_point) = alignment.point_at_m(hint_m) else {
            continue;
        };
        if line_length(anchor_point.to_point(), hint) > HINT_MAX_TRACK_DISTANCE {
            continue;
        }
        for &(far_joint, joint_distance) in &far_anchors {
            for direction in [1.0, -1.0] {
                let far_m = hint_m + direction * joint_distance;
                let Some(far_point) = alignment.point_at_m(far_m) else {
                    continue;
                };
                let measured = [
                    (anchor, anchor_point.to_point()),
                    (far_joint, far_point.to_point()),
                ];
                let Some(transform) = calculate_switch_transform(&measured, structure) else {
                    continue;
                };
                let joints_in_layout: Vec<(JointNumber, Point<f64>)> = structure
                    .alignment_joint_numbers()
                    .into_iter()
                    .filter_map(|n| {
                        structure
                            .joint_location(n)
                            .map(|loc| (n, transform.transform_point(loc)))
                    })
                    .collect();
                let fitted = fit_switch_from_joints(
                    &joints_in_layout,
                    structure,
                    tracks,
                    location_accuracy,
                    params,
                );
                if fitted.match_count() > 0
                    && best.as_ref().is_none_or(|b| fitted.score() > b.score())
                {
                    best = Some(fitted);
                }
            }
        }
    }
    best
}

/// Fits many switches in parallel, keyed by switch id.
pub fn fit_switches(
    requests: &[SwitchFitRequest<'_>],
    tracks: &[(LocationTrackId, &Alignment)],
    params: &FitParams,
) -> Vec<(SwitchId, Option<FittedSwitch>)> {
    requests
        .par_iter()
        .map(|request| {
            (
                request.switch_id,
                fit_switch(
                    request.hint,
                    request.structure,
                    tracks,
                    request.location_accuracy,
                    params,
                ),
            )
        })
        .collect()
}

/// Matches already-placed joint locations (e.g. from plan geometry or a
/// candidate transform) against track geometry.
pub fn fit_switch_from_joints(
    joints_in_layout: &[(JointNumber, Point<f64>)],
    structure: &SwitchStructure,
    tracks: &[(LocationTrackId, &Alignment)],
    location_accuracy: Option<LocationAccuracy>,
    params: &FitParams,
) -> FittedSwitch {
    let index = SegmentIndex::build(tracks);
    let mut joints: Vec<FittedSwitchJoint> = joints_in_layout
        .iter()
        .map(|&(number, location)| FittedSwitchJoint {
            number,
            location,
            matches: Vec::new(),
            location_accuracy,
        })
        .collect();
    joints.sort_by_key(|j| j.number);

    for joint in &mut joints {
        joint.matches = best_matches_per_track(
            joint.number,
            joint.location,
            structure,
            tracks,
            &index,
            params,
        );
    }
    FittedSwitch { joints }
}

/// Spatial index over all candidate segments of all tracks.
struct SegmentIndex {
    tree: RTree<SegmentEnvelope>,
}

struct SegmentEnvelope {
    envelope: AABB<[f64; 2]>,
    track_index: usize,
    segment_index: usize,
}

impl RTreeObject for SegmentEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl SegmentIndex {
    fn build(tracks: &[(LocationTrackId, &Alignment)]) -> Self {
        let envelopes = tracks
            .iter()
            .enumerate()
            .flat_map(|(track_index, (_, alignment))| {
                alignment
                    .segments()
                    .iter()
                    .enumerate()
                    .map(move |(segment_index, segment)| {
                        let bbox = segment.bbox();
                        SegmentEnvelope {
                            envelope: AABB::from_corners(
                                [bbox.min().x, bbox.min().y],
                                [bbox.max().x, bbox.max().y],
                            ),
                            track_index,
                            segment_index,
                        }
                    })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(envelopes),
        }
    }

    /// Segments whose bounding box comes within `radius` of `location`,
    /// in deterministic (track, segment) order.
    fn candidates_near(&self, location: Point<f64>, radius: f64) -> Vec<(usize, usize)> {
        let search = AABB::from_corners(
            [location.x() - radius, location.y() - radius],
            [location.x() + radius, location.y() + radius],
        );
        let mut hits: Vec<(usize, usize)> = self
            .tree
            .locate_in_envelope_intersecting(&search)
            .map(|e| (e.track_index, e.segment_index))
            .collect();
        hits.sort_unstable();
        hits
    }
}

fn best_matches_per_track(
    number: JointNumber,
    location: Point<f64>,
    structure: &SwitchStructure,
    tracks: &[(LocationTrackId, &Alignment)],
    index: &SegmentIndex,
    params: &FitParams,
) -> Vec<JointMatch> {
    let radius = params.endpoint_snap_distance.max(params.match_tolerance);
    // End rules: a structure alignment's first joint may not attach to a
    // segment's trailing endpoint, and its last joint may not attach to a
    // leading endpoint.
    let end_allowed = structure
        .alignments()
        .iter()
        .all(|a| a.first_joint() != number);
    let start_allowed = structure
        .alignments()
        .iter()
        .all(|a| a.last_joint() != number);

    let mut candidates: Vec<JointMatch> = Vec::new();
    for (track_index, segment_index) in index.candidates_near(location, radius) {
        let (track_id, alignment) = &tracks[track_index];
        let segment = &alignment.segments()[segment_index];

        // Perpendicular attachment along the segment polyline
        let mut line_distance = f64::INFINITY;
        let mut line_m = segment.start_m;
        for pair in segment.points().windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let t = closest_point_proportion(a.to_point(), b.to_point(), location).clamp(0.0, 1.0);
            let projected = interpolate(a.to_point(), b.to_point(), t);
            let d = line_length(projected, location);
            if d < line_distance {
                line_distance = d;
                line_m = segment.start_m + interpolate_f64(a.m, b.m, t);
            }
        }

        let start_distance = line_length(segment.start_point().to_point(), location);
        if start_allowed && start_distance <= params.endpoint_snap_distance {
            candidates.push(JointMatch {
                track_id: *track_id,
                segment_index,
                m: segment.start_m,
                match_type: JointMatchType::Start,
                distance: start_distance,
                distance_to_alignment: line_distance,
            });
        }
        let end_distance = line_length(segment.end_point().to_point(), location);
        if end_allowed && end_distance <= params.endpoint_snap_distance {
            candidates.push(JointMatch {
                track_id: *track_id,
                segment_index,
                m: segment.end_m(),
                match_type: JointMatchType::End,
                distance: end_distance,
                distance_to_alignment: line_distance,
            });
        }
        if line_distance <= params.match_tolerance {
            candidates.push(JointMatch {
                track_id: *track_id,
                segment_index,
                m: line_m,
                match_type: JointMatchType::Line,
                distance: line_distance,
                distance_to_alignment: line_distance,
            });
        }
    }

    // Best match per track: endpoint attachments beat line attachments,
    // then smallest distance, ties to the lowest segment index.
    candidates.sort_by(|a, b| {
        a.track_id
            .cmp(&b.track_id)
            .then_with(|| endpoint_rank(a.match_type).cmp(&endpoint_rank(b.match_type)))
            .then_with(|| a.distance.total_cmp(&b.distance))
            .then_with(|| a.segment_index.cmp(&b.segment_index))
    });
    candidates.dedup_by_key(|m| m.track_id);
    candidates
}

fn endpoint_rank(match_type: JointMatchType) -> u8 {
    match match_type {
        JointMatchType::Start | JointMatchType::End => 0,
        JointMatchType::Line => 1,
    }
}

/// The joint anchoring transform inference: a joint shared by several
/// structure alignments, preferring the presentation joint.
fn anchor_joint(structure: &SwitchStructure) -> Option<JointNumber> {
    let presentation = structure.presentation_joint_number();
    let on_alignments = |n: JointNumber| {
        structure
            .alignments()
            .iter()
            .filter(|a| a.joint_numbers.contains(&n))
            .count()
    };
    if on_alignments(presentation) >= 2 {
        return Some(presentation);
    }
    structure
        .alignment_joint_numbers()
        .into_iter()
        .find(|&n| on_alignments(n) >= 2)
        .or_else(|| {
            if on_alignments(presentation) > 0 {
                Some(presentation)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::switch::tests::simple_turnout;
    use crate::model::{GeometrySource, LayoutSegment};
    use approx::assert_abs_diff_eq;

    fn track(coordinates: &[(f64, f64)]) -> Alignment {
        Alignment::new(vec![
            LayoutSegment::from_coordinates(coordinates, 0.0, GeometrySource::Plan).unwrap(),
        ])
    }

    /// Tracks laid out exactly like the canonical turnout, shifted to
    /// (1000, 500): a straight track through joints 1-5-2 and a diverging
    /// track through 1-3.
    fn turnout_tracks() -> (Alignment, Alignment) {
        let straight = track(&[
            (990.0, 500.0),
            (1000.0, 500.0),
            (1011.077, 500.0),
            (1028.3, 500.0),
            (1040.0, 500.0),
        ]);
        let diverging = track(&[(1000.0, 500.0), (1028.195, 498.098), (1056.39, 496.196)]);
        (straight, diverging)
    }

    #[test]
    fn fit_places_joints_on_track_geometry() {
        let structure = simple_turnout();
        let (straight, diverging) = turnout_tracks();
        let tracks = vec![
            (LocationTrackId(1), &straight),
            (LocationTrackId(2), &diverging),
        ];
        let fitted = fit_switch(
            Point::new(1000.0, 500.05),
            &structure,
            &tracks,
            Some(LocationAccuracy::DigitizedAerialImage),
            &FitParams::default(),
        )
        .unwrap();

        let j1 = fitted.joint(JointNumber(1)).unwrap();
        assert_abs_diff_eq!(j1.location.x(), 1000.0, epsilon = 0.1);
        assert_abs_diff_eq!(j1.location.y(), 500.0, epsilon = 0.1);
        // Joint 1 sits on both tracks
        assert_eq!(j1.matches.len(), 2);
        assert_eq!(
            j1.location_accuracy,
            Some(LocationAccuracy::DigitizedAerialImage)
        );

        let j2 = fitted.joint(JointNumber(2)).unwrap();
        assert_eq!(j2.matches.len(), 1);
        assert_eq!(j2.matches[0].track_id, LocationTrackId(1));
        assert_abs_diff_eq!(j2.matches[0].m, 38.3, epsilon = 0.1);

        let j3 = fitted.joint(JointNumber(3)).unwrap();
        assert_eq!(j3.matches.len(), 1);
        assert_eq!(j3.matches[0].track_id, LocationTrackId(2));
    }

    #[test]
    fn fit_is_independent_of_track_direction() {
        let structure = simple_turnout();
        let (straight, diverging) = turnout_tracks();
        let reversed_straight = straight.reversed();
        let hint = Point::new(1000.0, 500.0);

        let forward = fit_switch(
            hint,
            &structure,
            &[
                (LocationTrackId(1), &straight),
                (LocationTrackId(2), &diverging),
            ],
            None,
            &FitParams::default(),
        )
        .unwrap();
        let backward = fit_switch(
            hint,
            &structure,
            &[
                (LocationTrackId(1), &reversed_straight),
                (LocationTrackId(2), &diverging),
            ],
            None,
            &FitParams::default(),
        )
        .unwrap();

        for (a, b) in forward.joints.iter().zip(backward.joints.iter()) {
            assert_eq!(a.number, b.number);
            assert_abs_diff_eq!(a.location.x(), b.location.x(), epsilon = 1e-6);
            assert_abs_diff_eq!(a.location.y(), b.location.y(), epsilon = 1e-6);
        }
    }

    #[test]
    fn fit_far_from_any_track_is_none() {
        let structure = simple_turnout();
        let (straight, diverging) = turnout_tracks();
        let tracks = vec![
            (LocationTrackId(1), &straight),
            (LocationTrackId(2), &diverging),
        ];
        assert!(
            fit_switch(
                Point::new(2000.0, 2000.0),
                &structure,
                &tracks,
                None,
                &FitParams::default(),
            )
            .is_none()
        );
    }

    #[test]
    fn first_joint_does_not_match_a_trailing_endpoint() {
        let structure = simple_turnout();
        // A track that ends exactly where joint 1 will be placed: its
        // trailing endpoint must not be used for the alignment-first joint.
        let ending = track(&[(980.0, 500.0), (1000.0, 500.0)]);
        let fitted = fit_switch_from_joints(
            &[(JointNumber(1), Point::new(1000.0, 500.0))],
            &structure,
            &[(LocationTrackId(9), &ending)],
            None,
            &FitParams::default(),
        );
        let j1 = fitted.joint(JointNumber(1)).unwrap();
        assert!(
            j1.matches
                .iter()
                .all(|m| m.match_type != JointMatchType::End)
        );
    }

    #[test]
    fn bulk_fitting_is_keyed_by_switch_id() {
        let structure = simple_turnout();
        let (straight, diverging) = turnout_tracks();
        let tracks = vec![
            (LocationTrackId(1), &straight),
            (LocationTrackId(2), &diverging),
        ];
        let requests = vec![
            SwitchFitRequest {
                switch_id: SwitchId(1),
                hint: Point::new(1000.0, 500.0),
                structure: &structure,
                location_accuracy: None,
            },
            SwitchFitRequest {
                switch_id: SwitchId(2),
                hint: Point::new(5000.0, 5000.0),
                structure: &structure,
                location_accuracy: None,
            },
        ];
        let results = fit_switches(&requests, &tracks, &FitParams::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, SwitchId(1));
        assert!(results[0].1.is_some());
        assert_eq!(results[1].0, SwitchId(2));
        assert!(results[1].1.is_none());
    }
}
