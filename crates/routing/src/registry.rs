//! Thread-safe store of registered obstacles.

use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use nav_geo::{GeoPoint, InvalidInputError, meters_to_degrees};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Size used when the caller does not give one.
pub const DEFAULT_OBSTACLE_SIZE_M: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObstacleId(Uuid);

impl ObstacleId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObstacleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ObstacleId {
    type Err = InvalidInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| InvalidInputError::Identifier(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub position: GeoPoint,
    /// Radius in meters.
    pub size_m: f64,
    pub created_at: DateTime<Utc>,
}

impl Obstacle {
    /// Radius converted to degrees for planar proximity tests.
    pub fn buffer_deg(&self) -> f64 {
        meters_to_degrees(self.size_m)
    }

    /// Whether `point` lies strictly inside the buffer.
    pub fn contains(&self, point: GeoPoint) -> bool {
        let dlat = point.lat - self.position.lat;
        let dlon = point.lon - self.position.lon;
        dlat * dlat + dlon * dlon < self.buffer_deg().powi(2)
    }
}

/// Obstacles keyed by id behind a single registry-wide lock.
#[derive(Default)]
pub struct ObstacleRegistry {
    obstacles: Mutex<HashMap<ObstacleId, Obstacle>>,
}

impl ObstacleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObstacleId, Obstacle>> {
        self.obstacles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, position: GeoPoint, size_m: f64) -> Result<ObstacleId, InvalidInputError> {
        if !size_m.is_finite() || size_m <= 0.0 {
            return Err(InvalidInputError::OutOfRange {
                field: "obstacle size",
                expected: "a positive number of meters",
                value: size_m,
            });
        }

        let obstacle = Obstacle {
            id: ObstacleId::generate(),
            position,
            size_m,
            created_at: Utc::now(),
        };
        let id = obstacle.id;
        self.lock().insert(id, obstacle);
        metrics::gauge!("routing_obstacles").increment(1.0);
        info!("Added obstacle {id} at {position} ({size_m} m)");
        Ok(id)
    }

    pub fn remove(&self, id: &ObstacleId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            metrics::gauge!("routing_obstacles").decrement(1.0);
            info!("Removed obstacle {id}");
        } else {
            warn!("Obstacle {id} not found");
        }
        removed
    }

    pub fn get(&self, id: &ObstacleId) -> Option<Obstacle> {
        self.lock().get(id).cloned()
    }

    /// Copy of every obstacle, oldest first.
    pub fn list(&self) -> Vec<Obstacle> {
        let mut obstacles: Vec<Obstacle> = self.lock().values().cloned().collect();
        obstacles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        obstacles
    }

    /// Returns how many obstacles were dropped.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut obstacles = self.lock();
            let removed = obstacles.len();
            obstacles.clear();
            removed
        };
        metrics::gauge!("routing_obstacles").set(0.0);
        info!("Cleared {removed} obstacles");
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn add_then_list_contains_one_new_entry() {
        let registry = ObstacleRegistry::new();
        let first = registry.add(point(10.9, 76.9), 2.0).unwrap();
        let second = registry.add(point(10.91, 76.91), 5.0).unwrap();
        assert_ne!(first, second);

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        let entry = listed.iter().find(|o| o.id == second).unwrap();
        assert_eq!(entry.position, point(10.91, 76.91));
        assert_eq!(entry.size_m, 5.0);
    }

    #[test]
    fn remove_reports_presence() {
        let registry = ObstacleRegistry::new();
        let id = registry.add(point(1.0, 2.0), 1.0).unwrap();
        assert!(registry.remove(&id));
        assert!(registry.list().iter().all(|o| o.id != id));
        assert!(!registry.remove(&id));
        assert!(!registry.remove(&"0b7c5a52-3c3b-4b8e-9b0a-2f6a1d2e3f40".parse().unwrap()));
    }

    #[test]
    fn clear_empties_unconditionally() {
        let registry = ObstacleRegistry::new();
        assert_eq!(registry.clear(), 0);
        registry.add(point(0.0, 0.0), 1.0).unwrap();
        registry.add(point(0.0, 0.1), 1.0).unwrap();
        assert_eq!(registry.clear(), 2);
        assert!(registry.list().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_bad_sizes_and_ids() {
        let registry = ObstacleRegistry::new();
        assert!(registry.add(point(0.0, 0.0), 0.0).is_err());
        assert!(registry.add(point(0.0, 0.0), f64::NAN).is_err());
        assert_eq!(
            "not-a-uuid".parse::<ObstacleId>(),
            Err(InvalidInputError::Identifier("not-a-uuid".into()))
        );
    }

    #[test]
    fn list_is_a_copy() {
        let registry = ObstacleRegistry::new();
        registry.add(point(0.0, 0.0), 1.0).unwrap();
        let snapshot = registry.list();
        registry.clear();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn concurrent_adds_get_unique_ids() {
        let registry = Arc::new(ObstacleRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..25)
                        .map(|j| registry.add(point(i as f64, j as f64), 1.0).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<ObstacleId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn buffer_containment() {
        let registry = ObstacleRegistry::new();
        let id = registry.add(point(10.0, 76.0), 111.0).unwrap();
        let obstacle = registry.get(&id).unwrap();
        assert!(obstacle.contains(point(10.0005, 76.0)));
        assert!(!obstacle.contains(point(10.002, 76.0)));
    }
}
