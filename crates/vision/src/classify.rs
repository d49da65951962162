//! Obstacle classification and monocular distance estimation.

use std::collections::{HashMap, HashSet};

/// Labels that count as navigation hazards, compared case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObstacleClasses {
    labels: HashSet<String>,
}

impl ObstacleClasses {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|label| label.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn contains(&self, class_label: &str) -> bool {
        self.labels.contains(&class_label.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for ObstacleClasses {
    fn default() -> Self {
        Self::new([
            "person",
            "bicycle",
            "car",
            "motorcycle",
            "bus",
            "truck",
            "fire hydrant",
            "stop sign",
            "bench",
            "chair",
        ])
    }
}

/// Pinhole distance estimate from apparent box width:
/// `distance = real_width * focal_length / box_width`.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceEstimator {
    pub focal_length_px: f32,
    pub default_width_m: f32,
    known_widths_m: HashMap<String, f32>,
}

impl DistanceEstimator {
    pub fn new(focal_length_px: f32) -> Self {
        Self {
            focal_length_px,
            ..Self::default()
        }
    }

    pub fn with_width(mut self, class_label: &str, width_m: f32) -> Self {
        self.known_widths_m
            .insert(class_label.to_lowercase(), width_m);
        self
    }

    pub fn real_width_m(&self, class_label: &str) -> f32 {
        self.known_widths_m
            .get(&class_label.to_lowercase())
            .copied()
            .unwrap_or(self.default_width_m)
    }

    /// `None` for degenerate boxes.
    pub fn estimate_m(&self, class_label: &str, box_width_px: f32) -> Option<f32> {
        if !box_width_px.is_finite() || box_width_px <= 0.0 {
            return None;
        }
        Some(self.real_width_m(class_label) * self.focal_length_px / box_width_px)
    }
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        let known_widths_m = [
            ("person", 0.5),
            ("bicycle", 0.6),
            ("car", 1.8),
            ("motorcycle", 0.8),
            ("bus", 2.5),
            ("truck", 2.5),
            ("fire hydrant", 0.3),
            ("stop sign", 0.6),
            ("bench", 1.5),
            ("chair", 0.5),
        ]
        .into_iter()
        .map(|(label, width)| (label.to_string(), width))
        .collect();

        Self {
            focal_length_px: 800.0,
            default_width_m: 0.5,
            known_widths_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn membership_ignores_case() {
        let classes = ObstacleClasses::default();
        assert!(classes.contains("Person"));
        assert!(classes.contains("fire hydrant"));
        assert!(!classes.contains("traffic light"));
        assert_eq!(classes.len(), 10);
    }

    #[test]
    fn distance_uses_known_width_then_default() {
        let estimator = DistanceEstimator::default();
        assert_relative_eq!(estimator.estimate_m("car", 160.0).unwrap(), 9.0);
        assert_relative_eq!(estimator.estimate_m("kite", 100.0).unwrap(), 4.0);
        assert_eq!(estimator.estimate_m("car", 0.0), None);
    }

    #[test]
    fn widths_can_be_overridden() {
        let estimator = DistanceEstimator::new(1000.0).with_width("Dog", 0.4);
        assert_relative_eq!(estimator.real_width_m("dog"), 0.4);
        assert_relative_eq!(estimator.estimate_m("dog", 200.0).unwrap(), 2.0);
    }
}
