//! Facade over detection, the obstacle registry, and route planning.
//!
//! This is the surface an API layer calls: coordinates arrive as loose JSON values in
//! either `[lat, lon]` or `{lat, lng}` form and are normalized here before reaching the
//! typed crates.

use std::sync::Arc;

use nav_geo::{GeoPoint, InvalidInputError};
use routing::{
    DEFAULT_OBSTACLE_SIZE_M, Obstacle, ObstacleId, ObstacleRegistry, RouteError, RoutePlanner,
    RouteResult,
};
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use vision::{Detection, DetectionPipeline, PipelineError, PipelineStatus, StopStatus};
use video_ingest::Frame;

/// Source used when a start request names none.
pub const DEFAULT_CAMERA_URL: &str = "rtsp://localhost:8554/stream";
/// Radius given to obstacles registered from detections.
pub const DETECTED_OBSTACLE_RADIUS_M: f64 = 5.0;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),
    #[error(transparent)]
    Route(#[from] RouteError),
}

pub struct NavigationService {
    pipeline: DetectionPipeline,
    planner: RoutePlanner,
}

impl NavigationService {
    /// The registry is the one the planner reroutes against.
    pub fn new(pipeline: DetectionPipeline, planner: RoutePlanner) -> Self {
        Self { pipeline, planner }
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    pub fn registry(&self) -> &Arc<ObstacleRegistry> {
        self.planner.registry()
    }

    pub fn start_detection(
        &self,
        source: Option<&str>,
        location: Option<&Value>,
    ) -> Result<(), ServiceError> {
        let location = location.map(GeoPoint::from_json).transpose()?;
        self.pipeline
            .start(source.unwrap_or(DEFAULT_CAMERA_URL), location)?;
        Ok(())
    }

    pub fn stop_detection(&self) -> StopStatus {
        self.pipeline.stop()
    }

    pub fn detection_status(&self) -> PipelineStatus {
        self.pipeline.status()
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.pipeline.detections()
    }

    pub fn detected_obstacles(&self) -> Vec<Detection> {
        self.pipeline.detected_obstacles()
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.pipeline.frame()
    }

    /// Latest frame with detection boxes and labels drawn in.
    pub fn annotated_frame(&self) -> Option<Frame> {
        self.pipeline.annotated_frame()
    }

    pub fn update_location(&self, location: &Value) -> Result<GeoPoint, InvalidInputError> {
        let location = GeoPoint::from_json(location)?;
        self.pipeline.update_location(location);
        Ok(location)
    }

    pub fn add_obstacle(
        &self,
        position: &Value,
        size_m: Option<f64>,
    ) -> Result<ObstacleId, InvalidInputError> {
        let position = GeoPoint::from_json(position)?;
        self.registry()
            .add(position, size_m.unwrap_or(DEFAULT_OBSTACLE_SIZE_M))
    }

    /// Register every currently detected, geolocated obstacle.
    pub fn register_detected_obstacles(&self) -> Vec<ObstacleId> {
        let ids: Vec<ObstacleId> = self
            .detected_obstacles()
            .iter()
            .filter_map(|det| det.geo_position)
            .filter_map(|position| {
                self.registry()
                    .add(position, DETECTED_OBSTACLE_RADIUS_M)
                    .ok()
            })
            .collect();
        info!("Registered {} detected obstacles", ids.len());
        ids
    }

    pub fn remove_obstacle(&self, id: &str) -> Result<bool, InvalidInputError> {
        let id: ObstacleId = id.parse()?;
        Ok(self.registry().remove(&id))
    }

    pub fn obstacles(&self) -> Vec<Obstacle> {
        self.registry().list()
    }

    pub fn clear_obstacles(&self) -> usize {
        self.registry().clear()
    }

    pub fn route(
        &self,
        start: &Value,
        end: &Value,
        waypoints: &[Value],
    ) -> Result<RouteResult, ServiceError> {
        let start = GeoPoint::from_json(start)?;
        let end = GeoPoint::from_json(end)?;
        let waypoints = waypoints
            .iter()
            .map(GeoPoint::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.planner.route(start, end, &waypoints)?)
    }

    pub fn reroute(&self, current: &Value, destination: &Value) -> Result<RouteResult, ServiceError> {
        let current = GeoPoint::from_json(current)?;
        let destination = GeoPoint::from_json(destination)?;
        Ok(self.planner.reroute(current, destination)?)
    }
}
