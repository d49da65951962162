//! Pixel → geographic projection.
//!
//! This is a coarse approximation, not a geodesy-grade transform: the camera is assumed
//! to face north from the device location, horizontal pixel offset maps linearly onto
//! the field of view, and vertical position maps linearly onto range (lower in frame is
//! closer). The offset is applied with a flat-earth conversion.

use crate::{distance::METERS_PER_DEGREE, point::GeoPoint};

/// Camera model parameters for [`project`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoProjector {
    pub field_of_view_deg: f64,
    pub max_range_m: f64,
}

impl Default for GeoProjector {
    fn default() -> Self {
        Self {
            field_of_view_deg: 60.0,
            max_range_m: 30.0,
        }
    }
}

impl GeoProjector {
    pub fn project(
        &self,
        pixel: (f64, f64),
        frame_size: (u32, u32),
        origin: GeoPoint,
    ) -> Option<GeoPoint> {
        project(
            pixel.0,
            pixel.1,
            frame_size.0,
            frame_size.1,
            origin,
            self.field_of_view_deg,
            self.max_range_m,
        )
    }
}

/// Map a frame pixel to an approximate position relative to `current`.
///
/// Returns `None` for an empty frame, where the normalization is undefined, and when the
/// offset leaves the valid coordinate range (near the poles the longitude scale blows up).
pub fn project(
    pixel_x: f64,
    pixel_y: f64,
    frame_width: u32,
    frame_height: u32,
    current: GeoPoint,
    field_of_view_deg: f64,
    max_range_m: f64,
) -> Option<GeoPoint> {
    if frame_width == 0 || frame_height == 0 {
        return None;
    }
    let center_x = frame_width as f64 / 2.0;
    let center_y = frame_height as f64 / 2.0;
    let norm_x = ((pixel_x - center_x) / center_x).clamp(-1.0, 1.0);
    let norm_y = ((pixel_y - center_y) / center_y).clamp(-1.0, 1.0);

    let angle = (norm_x * field_of_view_deg / 2.0).to_radians();
    let distance = max_range_m * (1.0 - (norm_y * 0.5 + 0.5));

    let lat_offset = distance * angle.cos() / METERS_PER_DEGREE;
    let lon_offset = distance * angle.sin() / (METERS_PER_DEGREE * current.lat.to_radians().cos());

    let shifted = current.offset_deg(lat_offset, lon_offset);
    GeoPoint::new(shifted.lat, shifted.lon).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ORIGIN: GeoPoint = GeoPoint {
        lat: 10.903831,
        lon: 76.899839,
    };

    #[test]
    fn frame_center_projects_half_range_straight_ahead() {
        let projected = project(320.0, 240.0, 640, 480, ORIGIN, 60.0, 30.0).unwrap();
        assert_relative_eq!(projected.lat - ORIGIN.lat, 15.0 / METERS_PER_DEGREE, epsilon = 1e-12);
        assert_relative_eq!(projected.lon, ORIGIN.lon, epsilon = 1e-12);
    }

    #[test]
    fn bottom_row_is_at_the_device() {
        let projected = project(320.0, 480.0, 640, 480, ORIGIN, 60.0, 30.0).unwrap();
        assert_relative_eq!(projected.lat, ORIGIN.lat, epsilon = 1e-12);
        assert_relative_eq!(projected.lon, ORIGIN.lon, epsilon = 1e-12);
    }

    #[test]
    fn right_edge_turns_by_half_the_field_of_view() {
        let projected = project(640.0, 0.0, 640, 480, ORIGIN, 60.0, 30.0).unwrap();
        let expected_lat = 30.0 * 30f64.to_radians().cos() / METERS_PER_DEGREE;
        let expected_lon =
            30.0 * 30f64.to_radians().sin() / (METERS_PER_DEGREE * ORIGIN.lat.to_radians().cos());
        assert_relative_eq!(projected.lat - ORIGIN.lat, expected_lat, epsilon = 1e-12);
        assert_relative_eq!(projected.lon - ORIGIN.lon, expected_lon, epsilon = 1e-12);
    }

    #[test]
    fn empty_frame_has_no_projection() {
        assert!(project(0.0, 0.0, 0, 480, ORIGIN, 60.0, 30.0).is_none());
        assert!(GeoProjector::default().project((1.0, 1.0), (640, 0), ORIGIN).is_none());
    }

    #[test]
    fn projection_past_the_pole_is_dropped() {
        let pole = GeoPoint::new(90.0, 0.0).unwrap();
        assert!(project(600.0, 100.0, 640, 480, pole, 60.0, 30.0).is_none());

        let near_pole = GeoPoint::new(89.99999, 0.0).unwrap();
        assert!(project(320.0, 0.0, 640, 480, near_pole, 60.0, 30.0).is_none());
        assert!(project(320.0, 480.0, 640, 480, near_pole, 60.0, 30.0).is_some());
    }
}
