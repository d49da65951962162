//! Point/segment geometry in raw degree space.
//!
//! Obstacle buffers are compared against these distances after converting metres with
//! [`crate::meters_to_degrees`]. Longitude degrees are not rescaled by latitude; the
//! buffers are small enough that the distortion is accepted.

use crate::point::GeoPoint;

/// Closest point on a segment to a query point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentProjection {
    /// Closest point on the segment.
    pub point: GeoPoint,
    /// Position along the segment, clamped to `[0, 1]`.
    pub t: f64,
    /// Squared distance (degrees²) between the query point and `point`.
    pub distance_sq: f64,
}

/// Project `p` onto segment `a`→`b`. A zero-length segment projects onto `a`.
pub fn project_onto_segment(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> SegmentProjection {
    let seg = (b.lat - a.lat, b.lon - a.lon);
    let rel = (p.lat - a.lat, p.lon - a.lon);
    let len_sq = seg.0 * seg.0 + seg.1 * seg.1;

    let t = if len_sq == 0.0 {
        0.0
    } else {
        ((rel.0 * seg.0 + rel.1 * seg.1) / len_sq).clamp(0.0, 1.0)
    };

    let point = a.offset_deg(t * seg.0, t * seg.1);
    let dlat = p.lat - point.lat;
    let dlon = p.lon - point.lon;
    SegmentProjection {
        point,
        t,
        distance_sq: dlat * dlat + dlon * dlon,
    }
}

/// Squared degree distance from `p` to segment `a`→`b`.
pub fn distance_sq_to_segment(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> f64 {
    project_onto_segment(p, a, b).distance_sq
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint { lat, lon }
    }

    #[test]
    fn projection_is_clamped_to_segment_ends() {
        let a = p(0.0, 0.0);
        let b = p(0.0, 1.0);

        let before = project_onto_segment(p(1.0, -1.0), a, b);
        assert_eq!(before.t, 0.0);
        assert_eq!(before.point, a);
        assert_relative_eq!(before.distance_sq, 2.0);

        let after = project_onto_segment(p(0.0, 3.0), a, b);
        assert_eq!(after.t, 1.0);
        assert_relative_eq!(after.distance_sq, 4.0);
    }

    #[test]
    fn interior_projection_is_perpendicular_foot() {
        let proj = project_onto_segment(p(0.5, 0.25), p(0.0, 0.0), p(0.0, 1.0));
        assert_relative_eq!(proj.t, 0.25);
        assert_relative_eq!(proj.point.lon, 0.25);
        assert_relative_eq!(proj.distance_sq, 0.25);
    }

    #[test]
    fn degenerate_segment_measures_to_its_point() {
        let a = p(2.0, 2.0);
        assert_relative_eq!(distance_sq_to_segment(p(3.0, 2.0), a, a), 1.0);
    }
}
