//! Navigation service wiring obstacle detection to obstacle-aware routing.

pub mod service;

pub use service::{
    DEFAULT_CAMERA_URL, DETECTED_OBSTACLE_RADIUS_M, NavigationService, ServiceError,
};
