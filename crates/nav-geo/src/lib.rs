//! Geographic primitives shared by the detection pipeline and the route planner.
//!
//! Everything in this crate is a pure function or a plain value type:
//! - `point`: the single internal coordinate type and caller-input normalization.
//! - `distance`: great-circle distance, bearing, and metre/degree conversion.
//! - `planar`: point-to-segment geometry in degree space used for obstacle buffers.
//! - `projector`: coarse pixel → latitude/longitude projection.

pub use distance::{
    EARTH_RADIUS_M, METERS_PER_DEGREE, bearing_deg, haversine_m, meters_to_degrees,
    polyline_length_m,
};
pub use error::InvalidInputError;
pub use planar::{SegmentProjection, distance_sq_to_segment, project_onto_segment};
pub use point::{CoordinateInput, GeoPoint};
pub use projector::{GeoProjector, project};

mod distance;
mod error;
mod planar;
mod point;
mod projector;
