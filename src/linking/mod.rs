//! Switch linking: writing a fitted switch into track segment topology.
//!
//! Linking takes the joint matches of a [`FittedSwitch`](crate::fitting::FittedSwitch)
//! and rewrites the affected tracks: segments are split at joint
//! positions, the spanned segments are tagged with the switch id, span
//! boundaries carry the joint numbers, and stale links of the same
//! switch elsewhere are cleared.

use std::collections::BTreeMap;

use crate::fitting::FittedSwitch;
use crate::model::{Alignment, JointNumber, LayoutSegment, SwitchStructure};
use crate::{LocationTrackId, SwitchId};

/// Default snap distance when splitting a segment at a joint position.
pub const JOINT_SPLIT_SNAP_DISTANCE: f64 = 0.01;

/// Default tolerance for treating a joint position as an existing
/// segment boundary.
pub const JOINT_SAME_POINT_TOLERANCE: f64 = 0.001;

/// A joint may be pulled out of an overlapping foreign switch span by at
/// most this much; deeper overlaps override the foreign switch instead.
pub const MAX_JOINT_OVERLAP_CORRECTION: f64 = 5.0;

/// Tolerances of the linker.
#[derive(Debug, Clone, Copy)]
pub struct LinkParams {
    pub split_snap_distance: f64,
    pub same_point_tolerance: f64,
    pub overlap_correction_limit: f64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            split_snap_distance: JOINT_SPLIT_SNAP_DISTANCE,
            same_point_tolerance: JOINT_SAME_POINT_TOLERANCE,
            overlap_correction_limit: MAX_JOINT_OVERLAP_CORRECTION,
        }
    }
}

/// A joint position to be written onto one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchLinkingJoint {
    pub number: JointNumber,
    /// Alignment-m of the joint on the track.
    pub m: f64,
}

/// Links a fitted switch into the given tracks.
///
/// Returns the updated geometry for every input track (cleared-only
/// tracks included), or `None` when no track carries both end joints of
/// any structure alignment, in which case nothing is modified.
pub fn link_switch(
    tracks: &BTreeMap<LocationTrackId, Alignment>,
    fitted: &FittedSwitch,
    switch_id: SwitchId,
    structure: &SwitchStructure,
    params: &LinkParams,
) -> Option<BTreeMap<LocationTrackId, Alignment>> {
    let mut linking_joints: BTreeMap<LocationTrackId, Vec<SwitchLinkingJoint>> = BTreeMap::new();
    for (&track_id, alignment) in tracks {
        let joints = calculate_linking_joints(fitted, structure, track_id);
        let mut joints = joints
            .into_iter()
            .map(|joint| SwitchLinkingJoint {
                m: correct_overlap(alignment, joint.m, switch_id, params.overlap_correction_limit),
                ..joint
            })
            .collect::<Vec<_>>();
        // Overlap correction can move a joint past a neighbour
        joints.sort_by(|a, b| a.m.total_cmp(&b.m));
        if !joints.is_empty() {
            linking_joints.insert(track_id, joints);
        }
    }
    if linking_joints.is_empty() {
        return None;
    }

    let updated = tracks
        .iter()
        .map(|(&track_id, alignment)| {
            let cleared = clear_links_to_switch(alignment, switch_id);
            let linked = match linking_joints.get(&track_id) {
                Some(joints) => link_joints_to_alignment(&cleared, switch_id, joints, params),
                None => cleared,
            };
            (track_id, linked)
        })
        .collect();
    Some(updated)
}

/// The joints of `fitted` that should be written onto `track_id`, sorted
/// by track m.
///
/// A track only receives a joint set that corresponds to one of the
/// structure's alignments, and only when both end joints of that
/// alignment matched the track; partial sets are dropped.
pub fn calculate_linking_joints(
    fitted: &FittedSwitch,
    structure: &SwitchStructure,
    track_id: LocationTrackId,
) -> Vec<SwitchLinkingJoint> {
    let matched: Vec<(JointNumber, f64)> = fitted
        .joints
        .iter()
        .filter_map(|joint| {
            joint
                .matches
                .iter()
                .find(|m| m.track_id == track_id)
                .map(|m| (joint.number, m.m))
        })
        .collect();

    // The structure alignment this track realizes: both of its end
    // joints must have matched, prefer the one covering the most joints.
    let best_alignment = structure
        .alignments()
        .iter()
        .filter(|a| {
            let has = |n: JointNumber| matched.iter().any(|&(number, _)| number == n);
            has(a.first_joint()) && has(a.last_joint())
        })
        .max_by_key(|a| {
            a.joint_numbers
                .iter()
                .filter(|&&n| matched.iter().any(|&(number, _)| number == n))
                .count()
        });
    let Some(switch_alignment) = best_alignment else {
        return Vec::new();
    };

    let mut joints: Vec<SwitchLinkingJoint> = matched
        .into_iter()
        .filter(|&(number, _)| switch_alignment.joint_numbers.contains(&number))
        .map(|(number, m)| SwitchLinkingJoint { number, m })
        .collect();
    joints.sort_by(|a, b| a.m.total_cmp(&b.m));
    joints
}

/// Removes every link to `switch_id` from the alignment. Geometry and
/// m-values are untouched.
pub fn clear_links_to_switch(alignment: &Alignment, switch_id: SwitchId) -> Alignment {
    Alignment::new(
        alignment
            .segments()
            .iter()
            .map(|segment| {
                if segment.switch_id == Some(switch_id) {
                    segment.clone().without_switch()
                } else {
                    segment.clone()
                }
            })
            .collect(),
    )
}

/// Pulls a joint position out of a span owned by another switch when the
/// overlap is within `limit`: the span start is tried first, then the
/// span end. Deeper overlaps keep the position, overriding the foreign
/// switch there.
fn correct_overlap(alignment: &Alignment, m: f64, switch_id: SwitchId, limit: f64) -> f64 {
    let Some(index) = alignment.segment_index_at_m(m) else {
        return m;
    };
    let segments = alignment.segments();
    let Some(foreign) = segments[index].switch_id.filter(|&id| id != switch_id) else {
        return m;
    };

    // Contiguous run of segments owned by the foreign switch
    let mut first = index;
    while first > 0 && segments[first - 1].switch_id == Some(foreign) {
        first -= 1;
    }
    let mut last = index;
    while last + 1 < segments.len() && segments[last + 1].switch_id == Some(foreign) {
        last += 1;
    }
    let span_start = segments[first].start_m;
    let span_end = segments[last].end_m();

    let to_start = m - span_start;
    let to_end = span_end - m;
    if to_start <= limit {
        span_start
    } else if to_end <= limit {
        span_end
    } else {
        m
    }
}

/// Rewrites one track: splits segments at the joint positions, tags the
/// joint span with the switch id and the boundaries with joint numbers.
fn link_joints_to_alignment(
    alignment: &Alignment,
    switch_id: SwitchId,
    joints: &[SwitchLinkingJoint],
    params: &LinkParams,
) -> Alignment {
    let span_min = joints.first().map_or(0.0, |j| j.m);
    let span_max = joints.last().map_or(0.0, |j| j.m);
    // Splitting snaps to existing vertices within the split snap
    // distance, so span boundaries can land up to that far from the
    // joint positions.
    let eps = params.split_snap_distance;

    let mut pieces: Vec<LayoutSegment> = Vec::with_capacity(alignment.segments().len() + joints.len());
    for segment in alignment.segments() {
        let cut_positions: Vec<f64> = joints
            .iter()
            .map(|j| j.m - segment.start_m)
            .filter(|&local| {
                local > params.same_point_tolerance
                    && local < segment.length() - params.same_point_tolerance
            })
            .collect();

        let mut remainder = segment.clone();
        let mut consumed = 0.0;
        for local in cut_positions {
            match remainder.split_at_m(local - consumed, params.split_snap_distance) {
                Ok((head, Some(tail))) => {
                    consumed += head.length();
                    pieces.push(head);
                    remainder = tail;
                }
                Ok((whole, None)) => remainder = whole,
                // Positions are strictly inside the remainder, so a
                // failed split leaves the piece unsplit.
                Err(_) => {}
            }
        }
        pieces.push(remainder);
    }

    let tagged = pieces
        .into_iter()
        .map(|piece| {
            let start = piece.start_m;
            let end = piece.end_m();
            let inside_span = start >= span_min - eps && end <= span_max + eps;
            if !inside_span {
                return piece;
            }
            let boundary_joint = |m: f64| {
                joints
                    .iter()
                    .find(|j| (j.m - m).abs() <= params.split_snap_distance)
                    .map(|j| j.number)
            };
            piece.with_switch(Some(switch_id), boundary_joint(start), boundary_joint(end))
        })
        .collect();

    Alignment::rebuild(combine_adjacent_joint_numbers(tagged, switch_id))
}

/// Makes adjacent segments of the same switch agree on one joint number
/// per shared boundary.
fn combine_adjacent_joint_numbers(
    mut segments: Vec<LayoutSegment>,
    switch_id: SwitchId,
) -> Vec<LayoutSegment> {
    for i in 1..segments.len() {
        let (prev, next) = {
            let (a, b) = segments.split_at_mut(i);
            (a.last_mut().expect("non-empty prefix"), &mut b[0])
        };
        if prev.switch_id != Some(switch_id) || next.switch_id != Some(switch_id) {
            continue;
        }
        let agreed = prev.end_joint_number.or(next.start_joint_number);
        prev.end_joint_number = agreed;
        next.start_joint_number = agreed;
    }
    segments
}
