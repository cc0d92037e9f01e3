//! Alignment segments: immutable runs of polyline geometry with
//! switch linkage and geometry provenance.

use geo::Rect;
use serde::{Deserialize, Serialize};

use crate::math::bbox_around;
use crate::model::point::SegmentPoint;
use crate::model::switch::JointNumber;
use crate::{Error, GeometryElementId, SwitchId};

/// Where a segment's geometry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometrySource {
    /// Imported from an external system without plan geometry.
    Imported,
    /// Taken from a geometry plan element.
    Plan,
    /// Synthesized, e.g. a connector between spliced geometries.
    Generated,
}

/// Result of locating an m-value within a segment's point sequence.
#[derive(Debug, Clone, Copy)]
pub struct SegmentPointSeek {
    /// The located point: an existing vertex when one lies within snap
    /// distance, otherwise interpolated.
    pub point: SegmentPoint,
    /// Index of the first vertex strictly after the located point.
    pub next_index: usize,
    /// True when an existing vertex was reused instead of interpolating.
    pub snapped: bool,
}

/// One segment of an alignment: at least two points with strictly
/// increasing segment-local m-values starting at zero.
///
/// Segments are value objects; all editing operations return new segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSegment {
    points: Vec<SegmentPoint>,
    /// Offset of this segment's first point along the owning alignment.
    pub start_m: f64,
    pub switch_id: Option<SwitchId>,
    pub start_joint_number: Option<JointNumber>,
    pub end_joint_number: Option<JointNumber>,
    /// Plan element the geometry was taken from, if any.
    pub source_id: Option<GeometryElementId>,
    /// Offset of this segment's first point within the source element.
    pub source_start_m: Option<f64>,
    pub source: GeometrySource,
}

impl LayoutSegment {
    pub fn new(
        points: Vec<SegmentPoint>,
        start_m: f64,
        source: GeometrySource,
    ) -> Result<Self, Error> {
        if points.len() < 2 {
            return Err(Error::TooFewPoints(points.len()));
        }
        if points
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite() || !p.m.is_finite())
        {
            return Err(Error::NonFiniteCoordinate);
        }
        if points[0].m != 0.0 || points.windows(2).any(|w| w[0].m >= w[1].m) {
            return Err(Error::NonMonotonicM);
        }
        Ok(Self {
            points,
            start_m,
            switch_id: None,
            start_joint_number: None,
            end_joint_number: None,
            source_id: None,
            source_start_m: None,
            source,
        })
    }

    /// Builds a segment from bare coordinates, deriving m-values from
    /// cumulative point distances.
    pub fn from_coordinates(
        coordinates: &[(f64, f64)],
        start_m: f64,
        source: GeometrySource,
    ) -> Result<Self, Error> {
        let mut points = Vec::with_capacity(coordinates.len());
        let mut m = 0.0;
        for (i, &(x, y)) in coordinates.iter().enumerate() {
            if i > 0 {
                let (px, py) = coordinates[i - 1];
                m += (x - px).hypot(y - py);
            }
            points.push(SegmentPoint::new(x, y, None, m));
        }
        Self::new(points, start_m, source)
    }

    pub fn points(&self) -> &[SegmentPoint] {
        &self.points
    }

    pub fn start_point(&self) -> SegmentPoint {
        self.points[0]
    }

    pub fn end_point(&self) -> SegmentPoint {
        *self.points.last().expect("segment has points")
    }

    pub fn length(&self) -> f64 {
        self.end_point().m
    }

    /// Alignment-m of the segment end.
    pub fn end_m(&self) -> f64 {
        self.start_m + self.length()
    }

    pub fn bbox(&self) -> Rect<f64> {
        bbox_around(self.points.iter().map(|p| p.to_point())).expect("segment has points")
    }

    pub fn with_start_m(mut self, start_m: f64) -> Self {
        self.start_m = start_m;
        self
    }

    pub fn with_switch(
        mut self,
        switch_id: Option<SwitchId>,
        start_joint_number: Option<JointNumber>,
        end_joint_number: Option<JointNumber>,
    ) -> Self {
        self.switch_id = switch_id;
        self.start_joint_number = start_joint_number;
        self.end_joint_number = end_joint_number;
        self
    }

    pub fn without_switch(self) -> Self {
        self.with_switch(None, None, None)
    }

    /// Locates the point at segment-local `m`, reusing an existing vertex
    /// when one lies within `snap_distance` of it (measured along m).
    /// Values outside the segment clamp to its end points.
    pub fn seek_point_at_m(&self, m: f64, snap_distance: f64) -> SegmentPointSeek {
        if m <= self.points[0].m {
            return SegmentPointSeek {
                point: self.points[0],
                next_index: 1,
                snapped: true,
            };
        }
        let last = self.points.len() - 1;
        if m >= self.points[last].m {
            return SegmentPointSeek {
                point: self.points[last],
                next_index: self.points.len(),
                snapped: true,
            };
        }
        // First index with point m >= target; its predecessor exists since
        // the target is strictly inside the segment.
        let upper = self.points.partition_point(|p| p.m < m);
        let lower = upper - 1;
        let d_upper = self.points[upper].m - m;
        let d_lower = m - self.points[lower].m;
        if d_upper <= d_lower && d_upper <= snap_distance {
            SegmentPointSeek {
                point: self.points[upper],
                next_index: upper + 1,
                snapped: true,
            }
        } else if d_lower <= snap_distance {
            SegmentPointSeek {
                point: self.points[lower],
                next_index: upper,
                snapped: true,
            }
        } else {
            let span = self.points[upper].m - self.points[lower].m;
            let t = d_lower / span;
            SegmentPointSeek {
                point: self.points[lower].interpolate_to(&self.points[upper], t),
                next_index: upper,
                snapped: false,
            }
        }
    }

    /// New segment covering the segment-local range `min_m..max_m`,
    /// interpolating boundary points unless an existing vertex is within
    /// `snap_distance`. The result's m-values restart at zero; provenance
    /// advances by the amount cut from the start.
    pub fn slice(&self, min_m: f64, max_m: f64, snap_distance: f64) -> Result<LayoutSegment, Error> {
        if !(min_m < max_m) {
            return Err(Error::EmptyRange {
                min: min_m,
                max: max_m,
            });
        }
        let start = self.seek_point_at_m(min_m, snap_distance);
        let end = self.seek_point_at_m(max_m, snap_distance);
        if end.point.m - start.point.m <= 0.0 {
            return Err(Error::EmptySlice);
        }

        let first_m = start.point.m;
        let mut points = Vec::with_capacity(end.next_index - start.next_index + 2);
        points.push(start.point.with_m(0.0));
        for p in &self.points[start.next_index..end.next_index] {
            if p.m < end.point.m {
                points.push(p.with_m(p.m - first_m));
            }
        }
        points.push(end.point.with_m(end.point.m - first_m));

        let mut sliced = LayoutSegment::new(points, self.start_m + first_m, self.source)?;
        sliced.switch_id = self.switch_id;
        sliced.start_joint_number = if first_m == 0.0 {
            self.start_joint_number
        } else {
            None
        };
        sliced.end_joint_number = if end.point.m == self.length() {
            self.end_joint_number
        } else {
            None
        };
        sliced.source_id = self.source_id;
        sliced.source_start_m = self.source_start_m.map(|s| s + first_m);
        Ok(sliced)
    }

    /// Splits at segment-local `m`. Returns the segment unsplit when the
    /// position is within `snap_distance` of either end.
    pub fn split_at_m(
        &self,
        m: f64,
        snap_distance: f64,
    ) -> Result<(LayoutSegment, Option<LayoutSegment>), Error> {
        if m <= snap_distance || m >= self.length() - snap_distance {
            return Ok((self.clone(), None));
        }
        let head = self.slice(0.0, m, snap_distance)?;
        let tail = self.slice(head.length(), self.length(), snap_distance)?;
        Ok((head, Some(tail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn straight_segment() -> LayoutSegment {
        // Five points along the y-axis, one meter apart
        LayoutSegment::from_coordinates(
            &[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0), (0.0, 3.0), (0.0, 4.0)],
            0.0,
            GeometrySource::Plan,
        )
        .unwrap()
    }

    #[test]
    fn construction_rejects_bad_geometry() {
        assert!(matches!(
            LayoutSegment::new(
                vec![SegmentPoint::new(0.0, 0.0, None, 0.0)],
                0.0,
                GeometrySource::Plan
            ),
            Err(Error::TooFewPoints(1))
        ));
        assert!(matches!(
            LayoutSegment::new(
                vec![
                    SegmentPoint::new(0.0, 0.0, None, 0.0),
                    SegmentPoint::new(0.0, 1.0, None, 0.0),
                ],
                0.0,
                GeometrySource::Plan
            ),
            Err(Error::NonMonotonicM)
        ));
        assert!(matches!(
            LayoutSegment::new(
                vec![
                    SegmentPoint::new(0.0, 0.0, None, 0.0),
                    SegmentPoint::new(f64::NAN, 1.0, None, 1.0),
                ],
                0.0,
                GeometrySource::Plan
            ),
            Err(Error::NonFiniteCoordinate)
        ));
    }

    #[test]
    fn seek_interpolates_between_vertices() {
        let seg = straight_segment();
        let seek = seg.seek_point_at_m(2.5, 0.001);
        assert!(!seek.snapped);
        assert_abs_diff_eq!(seek.point.x, 0.0);
        assert_abs_diff_eq!(seek.point.y, 2.5);
        assert_abs_diff_eq!(seek.point.m, 2.5);
        assert_eq!(seek.next_index, 3);
    }

    #[test]
    fn seek_snaps_to_close_vertex() {
        let seg = straight_segment();
        let seek = seg.seek_point_at_m(2.995, 0.01);
        assert!(seek.snapped);
        assert_abs_diff_eq!(seek.point.m, 3.0);
    }

    #[test]
    fn seek_clamps_outside_segment() {
        let seg = straight_segment();
        assert_abs_diff_eq!(seg.seek_point_at_m(-1.0, 0.001).point.m, 0.0);
        assert_abs_diff_eq!(seg.seek_point_at_m(99.0, 0.001).point.m, 4.0);
    }

    #[test]
    fn slice_renumbers_from_zero_and_tracks_provenance() {
        let mut seg = straight_segment();
        seg.source_id = Some(GeometryElementId(7));
        seg.source_start_m = Some(10.0);

        let sliced = seg.slice(1.5, 3.5, 0.001).unwrap();
        assert_abs_diff_eq!(sliced.points()[0].m, 0.0);
        assert_abs_diff_eq!(sliced.length(), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(sliced.start_m, 1.5);
        // Cut 1.5 from the start of the source element
        assert_abs_diff_eq!(sliced.source_start_m.unwrap(), 11.5);
        assert_abs_diff_eq!(sliced.start_point().y, 1.5);
        assert_abs_diff_eq!(sliced.end_point().y, 3.5);
    }

    #[test]
    fn slice_keeping_start_preserves_source_start_m() {
        let mut seg = straight_segment();
        seg.source_start_m = Some(10.0);
        let sliced = seg.slice(0.0, 2.0, 0.001).unwrap();
        assert_abs_diff_eq!(sliced.source_start_m.unwrap(), 10.0);
    }

    #[test]
    fn slice_of_slice_is_stable() {
        let seg = straight_segment();
        let once = seg.slice(1.0, 3.0, 0.001).unwrap();
        let twice = once.slice(0.0, once.length(), 0.001).unwrap();
        assert_eq!(once.points(), twice.points());
    }

    #[test]
    fn slice_rejects_empty_range() {
        let seg = straight_segment();
        assert!(matches!(
            seg.slice(2.0, 2.0, 0.001),
            Err(Error::EmptyRange { .. })
        ));
    }

    #[test]
    fn split_reuses_whole_segment_near_ends() {
        let seg = straight_segment();
        let (head, tail) = seg.split_at_m(0.005, 0.01).unwrap();
        assert!(tail.is_none());
        assert_eq!(head.points(), seg.points());
    }

    #[test]
    fn split_in_the_middle_is_contiguous() {
        let seg = straight_segment();
        let (head, tail) = seg.split_at_m(2.5, 0.001).unwrap();
        let tail = tail.unwrap();
        assert_abs_diff_eq!(head.length(), 2.5, epsilon = 1e-9);
        assert_abs_diff_eq!(tail.length(), 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(tail.start_m, 2.5);
        assert!(head.end_point().is_same(&tail.start_point()));
    }
}
