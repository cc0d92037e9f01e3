//! Alignment editing: slicing geometry by m-ranges, cutting alignments
//! and splicing donor geometry into or onto them.
//!
//! All operations are pure: they take alignments and return new segment
//! lists or alignments, renumbered so m-values restart from zero.

use crate::math::line_length;
use crate::model::{Alignment, GeometrySource, LayoutSegment, SegmentPoint};
use crate::{Error, LAYOUT_M_DELTA};

/// Which end of an alignment an extension attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentEnd {
    Start,
    End,
}

/// Geometry of `alignment` within the m-range `min_m..max_m` as a fresh
/// segment list: boundary points are interpolated unless an existing
/// vertex lies within the layout m-tolerance, and the result's m-values
/// restart from zero.
///
/// A zero-length or inverted range and a range outside the alignment are
/// errors; ranges are never clamped.
pub fn slice_by_range(
    alignment: &Alignment,
    min_m: f64,
    max_m: f64,
) -> Result<Vec<LayoutSegment>, Error> {
    if !(min_m < max_m) {
        return Err(Error::EmptyRange {
            min: min_m,
            max: max_m,
        });
    }
    let length = alignment.length();
    if min_m < -LAYOUT_M_DELTA || max_m > length + LAYOUT_M_DELTA {
        return Err(Error::RangeOutOfAlignment {
            min: min_m,
            max: max_m,
            length,
        });
    }

    let mut sliced = Vec::new();
    for segment in alignment.segments() {
        let local_min = (min_m - segment.start_m).max(0.0);
        let local_max = (max_m - segment.start_m).min(segment.length());
        // Skip segments the range only touches within tolerance
        if local_max - local_min <= LAYOUT_M_DELTA {
            continue;
        }
        sliced.push(segment.slice(local_min, local_max, LAYOUT_M_DELTA)?);
    }
    if sliced.is_empty() {
        return Err(Error::EmptySlice);
    }
    Ok(renumbered(sliced))
}

/// Cuts `alignment` down to the m-range `min_m..max_m`.
///
/// Provenance follows the geometry: a segment cut from its start has its
/// `source_start_m` advanced by the removed amount, a segment cut from
/// its end keeps it.
pub fn cut(alignment: &Alignment, min_m: f64, max_m: f64) -> Result<Alignment, Error> {
    Ok(Alignment::rebuild(slice_by_range(alignment, min_m, max_m)?))
}

/// Replaces the geometry of `original` within `original_range` with the
/// geometry of `donor` within `donor_range`.
///
/// Where a kept endpoint and a donated endpoint do not coincide, a
/// two-point [`GeometrySource::Generated`] connector segment bridges the
/// gap. Donor geometry and partially-cut original boundary segments lose
/// any switch linkage they carried; fully kept original segments keep
/// theirs.
pub fn replace_interval(
    original: &Alignment,
    original_range: (f64, f64),
    donor: &Alignment,
    donor_range: (f64, f64),
) -> Result<Vec<LayoutSegment>, Error> {
    let (min_m, max_m) = original_range;
    if !(min_m < max_m) {
        return Err(Error::EmptyRange {
            min: min_m,
            max: max_m,
        });
    }
    let length = original.length();
    if min_m < -LAYOUT_M_DELTA || max_m > length + LAYOUT_M_DELTA {
        return Err(Error::RangeOutOfAlignment {
            min: min_m,
            max: max_m,
            length,
        });
    }

    let mut head = if min_m > LAYOUT_M_DELTA {
        slice_by_range(original, 0.0, min_m)?
    } else {
        Vec::new()
    };
    if !is_segment_boundary(original, min_m) {
        clear_last_switch(&mut head);
    }

    let mut tail = if max_m < length - LAYOUT_M_DELTA {
        slice_by_range(original, max_m, length)?
    } else {
        Vec::new()
    };
    if !is_segment_boundary(original, max_m) {
        clear_first_switch(&mut tail);
    }

    let middle: Vec<LayoutSegment> = slice_by_range(donor, donor_range.0, donor_range.1)?
        .into_iter()
        .map(LayoutSegment::without_switch)
        .collect();

    let mut combined = head;
    if let (Some(last), Some(first)) = (combined.last(), middle.first()) {
        if let Some(connector) = connector_between(last.end_point(), first.start_point()) {
            combined.push(connector);
        }
    }
    combined.extend(middle);
    if let (Some(last), Some(first)) = (combined.last(), tail.first()) {
        if let Some(connector) = connector_between(last.end_point(), first.start_point()) {
            combined.push(connector);
        }
    }
    combined.extend(tail);
    Ok(renumbered(combined))
}

/// Extends `original` at the given end with the geometry of `donor`
/// within `donor_range`, bridging any gap with a generated connector.
pub fn extend_with_donor(
    original: &Alignment,
    end: AlignmentEnd,
    donor: &Alignment,
    donor_range: (f64, f64),
) -> Result<Alignment, Error> {
    let extension: Vec<LayoutSegment> = slice_by_range(donor, donor_range.0, donor_range.1)?
        .into_iter()
        .map(LayoutSegment::without_switch)
        .collect();

    let mut combined = Vec::with_capacity(original.segments().len() + extension.len() + 1);
    match end {
        AlignmentEnd::Start => {
            combined.extend(extension);
            if let Some(connector) = connector_between(
                combined.last().expect("extension is non-empty").end_point(),
                original.start_point(),
            ) {
                combined.push(connector);
            }
            combined.extend_from_slice(original.segments());
        }
        AlignmentEnd::End => {
            combined.extend_from_slice(original.segments());
            if let Some(connector) =
                connector_between(original.end_point(), extension[0].start_point())
            {
                combined.push(connector);
            }
            combined.extend(extension);
        }
    }
    Ok(Alignment::rebuild(renumbered(combined)))
}

/// Straight two-point segment bridging two locations, or `None` when
/// they already coincide within layout tolerance.
fn connector_between(from: SegmentPoint, to: SegmentPoint) -> Option<LayoutSegment> {
    if from.is_same(&to) {
        return None;
    }
    let gap = line_length(from.to_point(), to.to_point());
    let points = vec![
        SegmentPoint::new(from.x, from.y, from.z, 0.0),
        SegmentPoint::new(to.x, to.y, to.z, gap),
    ];
    Some(
        LayoutSegment::new(points, 0.0, GeometrySource::Generated)
            .expect("connector endpoints are distinct"),
    )
}

fn is_segment_boundary(alignment: &Alignment, m: f64) -> bool {
    alignment
        .segments()
        .iter()
        .any(|s| (s.start_m - m).abs() <= LAYOUT_M_DELTA || (s.end_m() - m).abs() <= LAYOUT_M_DELTA)
}

fn clear_last_switch(segments: &mut [LayoutSegment]) {
    if let Some(last) = segments.last_mut() {
        *last = last.clone().without_switch();
    }
}

fn clear_first_switch(segments: &mut [LayoutSegment]) {
    if let Some(first) = segments.first_mut() {
        *first = first.clone().without_switch();
    }
}

fn renumbered(segments: Vec<LayoutSegment>) -> Vec<LayoutSegment> {
    let mut m = 0.0;
    segments
        .into_iter()
        .map(|segment| {
            let length = segment.length();
            let renumbered = segment.with_start_m(m);
            m += length;
            renumbered
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn line_alignment(coordinates: &[(f64, f64)]) -> Alignment {
        Alignment::new(vec![
            LayoutSegment::from_coordinates(coordinates, 0.0, GeometrySource::Plan).unwrap(),
        ])
    }

    fn y_axis_alignment() -> Alignment {
        // Two segments along the y-axis, 10 m total
        let a = LayoutSegment::from_coordinates(
            &[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0), (0.0, 3.0), (0.0, 4.0), (0.0, 5.0)],
            0.0,
            GeometrySource::Plan,
        )
        .unwrap();
        let b = LayoutSegment::from_coordinates(
            &[(0.0, 5.0), (0.0, 7.5), (0.0, 10.0)],
            5.0,
            GeometrySource::Plan,
        )
        .unwrap();
        Alignment::new(vec![a, b])
    }

    #[test]
    fn slice_interpolates_boundaries_and_renumbers() {
        let alignment = y_axis_alignment();
        let sliced = slice_by_range(&alignment, 2.5, 6.25).unwrap();
        assert_abs_diff_eq!(sliced[0].start_m, 0.0);
        assert_abs_diff_eq!(sliced[0].start_point().y, 2.5);
        let last = sliced.last().unwrap();
        assert_abs_diff_eq!(last.end_point().y, 6.25);
        let total: f64 = sliced.iter().map(LayoutSegment::length).sum();
        assert_abs_diff_eq!(total, 3.75, epsilon = 1e-9);
    }

    #[test]
    fn slice_again_with_full_range_is_identity() {
        let alignment = y_axis_alignment();
        let once = cut(&alignment, 1.5, 8.0).unwrap();
        let twice = cut(&once, 0.0, once.length()).unwrap();
        assert_eq!(once.segments(), twice.segments());
    }

    #[test]
    fn slice_rejects_bad_ranges() {
        let alignment = y_axis_alignment();
        assert!(matches!(
            slice_by_range(&alignment, 3.0, 3.0),
            Err(Error::EmptyRange { .. })
        ));
        assert!(matches!(
            slice_by_range(&alignment, 5.0, 12.0),
            Err(Error::RangeOutOfAlignment { .. })
        ));
        assert!(matches!(
            slice_by_range(&alignment, -1.0, 5.0),
            Err(Error::RangeOutOfAlignment { .. })
        ));
    }

    #[test]
    fn cut_from_start_advances_provenance() {
        let mut segment = LayoutSegment::from_coordinates(
            &[(0.0, 0.0), (0.0, 5.0), (0.0, 10.0)],
            0.0,
            GeometrySource::Plan,
        )
        .unwrap();
        segment.source_id = Some(crate::GeometryElementId(1));
        segment.source_start_m = Some(0.0);
        let alignment = Alignment::new(vec![segment]);

        let from_start = cut(&alignment, 2.0, 10.0).unwrap();
        assert_abs_diff_eq!(from_start.segments()[0].source_start_m.unwrap(), 2.0);

        let from_end = cut(&alignment, 0.0, 8.0).unwrap();
        assert_abs_diff_eq!(from_end.segments()[0].source_start_m.unwrap(), 0.0);
    }

    #[test]
    fn replace_interval_round_trip_preserves_geometry() {
        let alignment = y_axis_alignment();
        // Replace a range with the same range of a copy of the alignment
        let result =
            replace_interval(&alignment, (2.0, 8.0), &alignment.clone(), (2.0, 8.0)).unwrap();
        let rebuilt = Alignment::rebuild(result);
        assert_abs_diff_eq!(rebuilt.length(), alignment.length(), epsilon = 1e-9);
        for m in [0.0, 1.0, 2.5, 5.0, 7.9, 10.0] {
            let p = rebuilt.point_at_m(m).unwrap();
            let q = alignment.point_at_m(m).unwrap();
            assert_abs_diff_eq!(p.x, q.x, epsilon = 1e-9);
            assert_abs_diff_eq!(p.y, q.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn replace_interval_bridges_gaps_with_generated_connectors() {
        let alignment = y_axis_alignment();
        // Donor offset 1 m to the side, leaving gaps at both splice points
        let donor = line_alignment(&[(1.0, 3.0), (1.0, 7.0)]);
        let result = replace_interval(&alignment, (3.0, 7.0), &donor, (0.0, 4.0)).unwrap();

        let connectors: Vec<&LayoutSegment> = result
            .iter()
            .filter(|s| s.source == GeometrySource::Generated)
            .collect();
        assert_eq!(connectors.len(), 2);
        assert_abs_diff_eq!(connectors[0].length(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(connectors[1].length(), 1.0, epsilon = 1e-9);

        // The result is a valid contiguous alignment
        let rebuilt = Alignment::rebuild(result);
        assert_abs_diff_eq!(rebuilt.length(), 3.0 + 1.0 + 4.0 + 1.0 + 3.0, epsilon = 1e-9);
    }

    #[test]
    fn replace_interval_with_touching_donor_adds_no_connector() {
        let alignment = y_axis_alignment();
        let donor = line_alignment(&[(0.0, 3.0), (0.0, 7.0)]);
        let result = replace_interval(&alignment, (3.0, 7.0), &donor, (0.0, 4.0)).unwrap();
        assert!(result.iter().all(|s| s.source != GeometrySource::Generated));
    }

    #[test]
    fn replace_interval_rejects_out_of_range_input() {
        let alignment = y_axis_alignment();
        let donor = line_alignment(&[(0.0, 0.0), (0.0, 4.0)]);
        assert!(matches!(
            replace_interval(&alignment, (3.0, 11.0), &donor, (0.0, 4.0)),
            Err(Error::RangeOutOfAlignment { .. })
        ));
        assert!(matches!(
            replace_interval(&alignment, (3.0, 7.0), &donor, (0.0, 9.0)),
            Err(Error::RangeOutOfAlignment { .. })
        ));
    }

    #[test]
    fn extension_attaches_donor_beyond_the_end() {
        let alignment = y_axis_alignment();
        let donor = line_alignment(&[(0.0, 10.0), (0.0, 15.0)]);
        let extended =
            extend_with_donor(&alignment, AlignmentEnd::End, &donor, (0.0, 5.0)).unwrap();
        assert_abs_diff_eq!(extended.length(), 15.0, epsilon = 1e-9);
        assert_abs_diff_eq!(extended.end_point().y, 15.0);

        let donor = line_alignment(&[(0.0, -4.0), (0.0, 0.0)]);
        let extended =
            extend_with_donor(&alignment, AlignmentEnd::Start, &donor, (0.0, 4.0)).unwrap();
        assert_abs_diff_eq!(extended.length(), 14.0, epsilon = 1e-9);
        assert_abs_diff_eq!(extended.start_point().y, -4.0);
        // Extension restarts the m-chain from zero
        assert_abs_diff_eq!(extended.segments()[0].start_m, 0.0);
    }
}
