//! Alignments: ordered, contiguous segment chains.

use geo::{Point, Rect};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::math::{
    IntersectType, bbox_around, closest_point_proportion, direction_between, interpolate,
    interpolate_f64, line_length,
};
use crate::model::point::SegmentPoint;
use crate::model::segment::LayoutSegment;
use crate::{LAYOUT_COORDINATE_DELTA, LAYOUT_M_DELTA};

/// An ordered chain of segments forming one continuous polyline.
///
/// Contiguity is a structural invariant, not an input condition: each
/// segment must start where the previous one ends (within
/// [`LAYOUT_COORDINATE_DELTA`]) and the `start_m` values must continue the
/// cumulative length chain (within [`LAYOUT_M_DELTA`]). Violations panic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    segments: Vec<LayoutSegment>,
}

impl Alignment {
    pub fn new(segments: Vec<LayoutSegment>) -> Self {
        assert!(!segments.is_empty(), "alignment must have segments");
        assert!(
            segments[0].start_m.abs() <= LAYOUT_M_DELTA,
            "alignment must start at m=0, got {}",
            segments[0].start_m
        );
        for (prev, next) in segments.iter().tuple_windows() {
            assert!(
                prev.end_point().is_same(&next.start_point()),
                "alignment segments must be contiguous: gap between ({}, {}) and ({}, {})",
                prev.end_point().x,
                prev.end_point().y,
                next.start_point().x,
                next.start_point().y,
            );
            assert!(
                (prev.end_m() - next.start_m).abs() <= LAYOUT_M_DELTA,
                "alignment m-chain must be continuous: {} -> {}",
                prev.end_m(),
                next.start_m,
            );
        }
        Self { segments }
    }

    /// Builds an alignment from segments whose geometry is contiguous but
    /// whose `start_m` values are stale, renumbering the m-chain from zero.
    pub fn rebuild(segments: Vec<LayoutSegment>) -> Self {
        let mut m = 0.0;
        let renumbered = segments
            .into_iter()
            .map(|segment| {
                let length = segment.length();
                let renumbered = segment.with_start_m(m);
                m += length;
                renumbered
            })
            .collect();
        Self::new(renumbered)
    }

    pub fn segments(&self) -> &[LayoutSegment] {
        &self.segments
    }

    pub fn length(&self) -> f64 {
        self.segments.last().expect("alignment has segments").end_m()
    }

    pub fn start_point(&self) -> SegmentPoint {
        self.segments[0].start_point()
    }

    pub fn end_point(&self) -> SegmentPoint {
        self.segments.last().expect("alignment has segments").end_point()
    }

    pub fn bbox(&self) -> Rect<f64> {
        bbox_around(
            self.segments
                .iter()
                .flat_map(|s| s.points().iter().map(|p| p.to_point())),
        )
        .expect("alignment has points")
    }

    /// Index of the segment whose m-range contains `m`. Values within
    /// [`LAYOUT_M_DELTA`] outside the alignment clamp to the end segments.
    pub fn segment_index_at_m(&self, m: f64) -> Option<usize> {
        if m < -LAYOUT_M_DELTA || m > self.length() + LAYOUT_M_DELTA {
            return None;
        }
        let i = self.segments.partition_point(|s| s.end_m() < m);
        Some(i.min(self.segments.len() - 1))
    }

    /// Point at alignment-m `m`, interpolated exactly (no snapping).
    pub fn point_at_m(&self, m: f64) -> Option<SegmentPoint> {
        let i = self.segment_index_at_m(m)?;
        let segment = &self.segments[i];
        let local = (m - segment.start_m).clamp(0.0, segment.length());
        Some(segment.seek_point_at_m(local, 0.0).point)
    }

    /// Tangent direction at alignment-m `m`, in radians.
    pub fn direction_at_m(&self, m: f64) -> Option<f64> {
        let i = self.segment_index_at_m(m)?;
        let segment = &self.segments[i];
        let local = (m - segment.start_m).clamp(0.0, segment.length());
        let points = segment.points();
        let upper = points
            .partition_point(|p| p.m < local)
            .clamp(1, points.len() - 1);
        Some(direction_between(
            points[upper - 1].to_point(),
            points[upper].to_point(),
        ))
    }

    /// Alignment-m of the point closest to `target`, with a classification
    /// of whether the target projects before the start or after the end of
    /// the geometry.
    pub fn closest_point_m(&self, target: Point<f64>) -> (f64, IntersectType) {
        let mut best_distance = f64::INFINITY;
        let mut best_m = 0.0;
        for segment in &self.segments {
            for (a, b) in segment.points().iter().tuple_windows() {
                let t = closest_point_proportion(a.to_point(), b.to_point(), target)
                    .clamp(0.0, 1.0);
                let p = interpolate(a.to_point(), b.to_point(), t);
                let d = line_length(p, target);
                if d < best_distance {
                    best_distance = d;
                    best_m = segment.start_m + interpolate_f64(a.m, b.m, t);
                }
            }
        }

        let intersect = if best_m <= LAYOUT_M_DELTA && self.projects_before_start(target) {
            IntersectType::Before
        } else if best_m >= self.length() - LAYOUT_M_DELTA && self.projects_after_end(target) {
            IntersectType::After
        } else {
            IntersectType::Within
        };
        (best_m, intersect)
    }

    fn projects_before_start(&self, target: Point<f64>) -> bool {
        let points = self.segments[0].points();
        closest_point_proportion(points[0].to_point(), points[1].to_point(), target) < 0.0
    }

    fn projects_after_end(&self, target: Point<f64>) -> bool {
        let points = self.segments.last().expect("alignment has segments").points();
        let n = points.len();
        closest_point_proportion(points[n - 2].to_point(), points[n - 1].to_point(), target) > 1.0
    }

    /// The same geometry walked in the opposite direction. Switch joint
    /// numbers swap ends; provenance offsets are kept as they were.
    pub fn reversed(&self) -> Alignment {
        let segments = self
            .segments
            .iter()
            .rev()
            .map(|segment| {
                let length = segment.length();
                let points = segment
                    .points()
                    .iter()
                    .rev()
                    .map(|p| p.with_m(length - p.m))
                    .collect();
                let mut reversed = LayoutSegment::new(points, 0.0, segment.source)
                    .expect("reversal preserves validity");
                reversed.switch_id = segment.switch_id;
                reversed.start_joint_number = segment.end_joint_number;
                reversed.end_joint_number = segment.start_joint_number;
                reversed.source_id = segment.source_id;
                reversed.source_start_m = segment.source_start_m;
                reversed
            })
            .collect();
        Alignment::rebuild(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::segment::GeometrySource;
    use approx::assert_abs_diff_eq;

    fn two_segment_alignment() -> Alignment {
        // L-shape: 4 m up the y-axis, then 3 m along x
        let a = LayoutSegment::from_coordinates(
            &[(0.0, 0.0), (0.0, 2.0), (0.0, 4.0)],
            0.0,
            GeometrySource::Plan,
        )
        .unwrap();
        let b = LayoutSegment::from_coordinates(
            &[(0.0, 4.0), (3.0, 4.0)],
            4.0,
            GeometrySource::Plan,
        )
        .unwrap();
        Alignment::new(vec![a, b])
    }

    #[test]
    #[should_panic(expected = "contiguous")]
    fn gap_between_segments_panics() {
        let a = LayoutSegment::from_coordinates(&[(0.0, 0.0), (0.0, 4.0)], 0.0, GeometrySource::Plan)
            .unwrap();
        let b = LayoutSegment::from_coordinates(&[(1.0, 4.0), (3.0, 4.0)], 4.0, GeometrySource::Plan)
            .unwrap();
        Alignment::new(vec![a, b]);
    }

    #[test]
    #[should_panic(expected = "m-chain")]
    fn stale_start_m_panics() {
        let a = LayoutSegment::from_coordinates(&[(0.0, 0.0), (0.0, 4.0)], 0.0, GeometrySource::Plan)
            .unwrap();
        let b = LayoutSegment::from_coordinates(&[(0.0, 4.0), (3.0, 4.0)], 7.0, GeometrySource::Plan)
            .unwrap();
        Alignment::new(vec![a, b]);
    }

    #[test]
    fn rebuild_renumbers_the_m_chain() {
        let a = LayoutSegment::from_coordinates(&[(0.0, 0.0), (0.0, 4.0)], 0.0, GeometrySource::Plan)
            .unwrap();
        let b = LayoutSegment::from_coordinates(&[(0.0, 4.0), (3.0, 4.0)], 99.0, GeometrySource::Plan)
            .unwrap();
        let alignment = Alignment::rebuild(vec![a, b]);
        assert_abs_diff_eq!(alignment.segments()[1].start_m, 4.0);
        assert_abs_diff_eq!(alignment.length(), 7.0);
    }

    #[test]
    fn point_at_m_interpolates_across_vertices() {
        let alignment = two_segment_alignment();
        let p = alignment.point_at_m(2.5).unwrap();
        assert_abs_diff_eq!(p.x, 0.0);
        assert_abs_diff_eq!(p.y, 2.5);
        let p = alignment.point_at_m(5.0).unwrap();
        assert_abs_diff_eq!(p.x, 1.0);
        assert_abs_diff_eq!(p.y, 4.0);
        assert!(alignment.point_at_m(7.5).is_none());
    }

    #[test]
    fn closest_point_m_projects_onto_geometry() {
        let alignment = two_segment_alignment();
        let (m, intersect) = alignment.closest_point_m(Point::new(1.5, 3.0));
        assert_eq!(intersect, IntersectType::Within);
        // Closer to the second segment's edge at y=4 than to the y-axis?
        // (1.5, 3.0) is 1.0 from the edge y=4 and 1.5 from the y-axis.
        assert_abs_diff_eq!(m, 5.5, epsilon = 1e-9);
    }

    #[test]
    fn projection_beyond_ends_is_classified() {
        let alignment = two_segment_alignment();
        let (m, intersect) = alignment.closest_point_m(Point::new(0.5, -2.0));
        assert_eq!(intersect, IntersectType::Before);
        assert_abs_diff_eq!(m, 0.0);
        let (m, intersect) = alignment.closest_point_m(Point::new(5.0, 4.5));
        assert_eq!(intersect, IntersectType::After);
        assert_abs_diff_eq!(m, 7.0, epsilon = 1e-9);
    }

    #[test]
    fn reversal_flips_geometry_and_keeps_length() {
        let alignment = two_segment_alignment();
        let reversed = alignment.reversed();
        assert_abs_diff_eq!(reversed.length(), alignment.length(), epsilon = 1e-9);
        assert_abs_diff_eq!(reversed.start_point().x, 3.0);
        assert_abs_diff_eq!(reversed.end_point().y, 0.0);
        let p = reversed.point_at_m(1.0).unwrap();
        assert_abs_diff_eq!(p.x, 2.0);
        assert_abs_diff_eq!(p.y, 4.0);
    }

    #[test]
    fn direction_follows_the_walk() {
        let alignment = two_segment_alignment();
        assert_abs_diff_eq!(
            alignment.direction_at_m(1.0).unwrap(),
            std::f64::consts::FRAC_PI_2
        );
        assert_abs_diff_eq!(alignment.direction_at_m(5.0).unwrap(), 0.0);
    }
}
