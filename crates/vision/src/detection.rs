//! Per-frame detection records and the filtering/enrichment that produces them.

use chrono::{DateTime, Utc};
use ml_core::{BoundingBox, InferenceDetection};
use nav_geo::{GeoPoint, GeoProjector};
use serde::Serialize;
use uuid::Uuid;

use crate::classify::{DistanceEstimator, ObstacleClasses};

/// One object found in a processed frame. Immutable once published.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub id: Uuid,
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub center: (f32, f32),
    /// `None` while geolocation is disabled (no device location known).
    pub geo_position: Option<GeoPoint>,
    pub is_obstacle: bool,
    pub estimated_distance_m: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

/// Everything needed to turn raw model output into [`Detection`]s.
pub struct DetectionContext<'a> {
    pub confidence_threshold: f32,
    pub classes: &'a ObstacleClasses,
    pub distance: &'a DistanceEstimator,
    pub projector: GeoProjector,
    pub location: Option<GeoPoint>,
}

/// Drop low-confidence results and enrich the rest.
pub fn build_detections(
    raw: Vec<InferenceDetection>,
    frame_size: (u32, u32),
    ctx: &DetectionContext<'_>,
) -> Vec<Detection> {
    let timestamp = Utc::now();
    raw.into_iter()
        .filter(|det| det.score.is_finite() && det.score >= ctx.confidence_threshold)
        .map(|det| {
            let center = det.bbox.center();
            let is_obstacle = ctx.classes.contains(&det.class_label);
            let geo_position = ctx.location.and_then(|origin| {
                ctx.projector
                    .project((center.0 as f64, center.1 as f64), frame_size, origin)
            });
            let estimated_distance_m = if is_obstacle {
                ctx.distance.estimate_m(&det.class_label, det.bbox.width())
            } else {
                None
            };

            Detection {
                id: Uuid::new_v4(),
                class_label: det.class_label,
                confidence: det.score,
                bbox: det.bbox,
                center,
                geo_position,
                is_obstacle,
                estimated_distance_m,
                timestamp,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raw(label: &str, score: f32, bbox: [f32; 4]) -> InferenceDetection {
        InferenceDetection {
            bbox: BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
            score,
            class_label: label.to_string(),
        }
    }

    #[test]
    fn filters_by_threshold_and_classifies() {
        let classes = ObstacleClasses::default();
        let distance = DistanceEstimator::default();
        let ctx = DetectionContext {
            confidence_threshold: 0.5,
            classes: &classes,
            distance: &distance,
            projector: GeoProjector::default(),
            location: None,
        };
        let detections = build_detections(
            vec![
                raw("person", 0.9, [100.0, 100.0, 200.0, 300.0]),
                raw("car", 0.49, [0.0, 0.0, 10.0, 10.0]),
                raw("kite", 0.5, [10.0, 10.0, 30.0, 30.0]),
                raw("dog", f32::NAN, [0.0, 0.0, 1.0, 1.0]),
            ],
            (640, 480),
            &ctx,
        );

        assert_eq!(detections.len(), 2);
        assert!(detections.iter().all(|d| d.confidence >= 0.5));

        let person = &detections[0];
        assert!(person.is_obstacle);
        assert_eq!(person.center, (150.0, 200.0));
        assert_relative_eq!(person.estimated_distance_m.unwrap(), 4.0);
        assert_eq!(person.geo_position, None);

        let kite = &detections[1];
        assert!(!kite.is_obstacle);
        assert_eq!(kite.estimated_distance_m, None);
        assert_ne!(person.id, kite.id);
    }

    #[test]
    fn projects_when_location_is_known() {
        let classes = ObstacleClasses::default();
        let distance = DistanceEstimator::default();
        let origin = GeoPoint::new(10.903831, 76.899839).unwrap();
        let ctx = DetectionContext {
            confidence_threshold: 0.5,
            classes: &classes,
            distance: &distance,
            projector: GeoProjector::default(),
            location: Some(origin),
        };
        let detections =
            build_detections(vec![raw("bench", 0.8, [300.0, 200.0, 340.0, 280.0])], (640, 480), &ctx);

        let position = detections[0].geo_position.unwrap();
        assert_relative_eq!(position.lon, origin.lon, epsilon = 1e-12);
        assert!(position.lat > origin.lat);
    }
}
