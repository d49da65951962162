//! Route queries and obstacle-aware re-planning.
//!
//! Selection order for [`RoutePlanner::route`]: the road graph when one is loaded,
//! otherwise the remote service, otherwise a straight polyline through the requested
//! points. [`RoutePlanner::reroute`] penalizes graph edges near registered obstacles,
//! and falls back to synthesizing detour waypoints when there is no graph or the
//! penalized graph has no path.

use std::{iter, sync::Arc};

use metrics::counter;
use nav_geo::{
    GeoPoint, InvalidInputError, SegmentProjection, meters_to_degrees, polyline_length_m,
    project_onto_segment,
};
use serde::Serialize;
use tracing::{debug, info_span, warn};

use crate::{
    error::RouteError,
    graph::{NodeId, RoadGraph},
    registry::{Obstacle, ObstacleRegistry},
    remote::RemoteRoutingService,
};

/// Which stage produced a [`RouteResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Graph,
    PenalizedGraph,
    Remote,
    Direct,
    Detour,
}

impl RouteSource {
    pub fn label(self) -> &'static str {
        match self {
            RouteSource::Graph => "graph",
            RouteSource::PenalizedGraph => "penalized_graph",
            RouteSource::Remote => "remote",
            RouteSource::Direct => "direct",
            RouteSource::Detour => "detour",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteResult {
    /// At least two points.
    pub coordinates: Vec<GeoPoint>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub source: RouteSource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannerConfig {
    /// Used to estimate durations for graph and direct routes.
    pub average_speed_kmh: f64,
    /// Weight multiplier for graph edges near an obstacle.
    pub edge_penalty_factor: f64,
    /// Detour waypoints sit `size * buffer_factor * offset_factor` meters from the obstacle.
    pub buffer_factor: f64,
    pub offset_factor: f64,
    /// Rounds of waypoint insertion before a detour is declared impossible.
    pub max_detour_passes: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            average_speed_kmh: 30.0,
            edge_penalty_factor: 100.0,
            buffer_factor: 2.0,
            offset_factor: 2.0,
            max_detour_passes: 3,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), InvalidInputError> {
        let out_of_range = |field, expected, value| InvalidInputError::OutOfRange {
            field,
            expected,
            value,
        };
        if !(self.average_speed_kmh.is_finite() && self.average_speed_kmh > 0.0) {
            return Err(out_of_range(
                "average_speed_kmh",
                "a positive finite speed",
                self.average_speed_kmh,
            ));
        }
        if !(self.edge_penalty_factor.is_finite() && self.edge_penalty_factor >= 1.0) {
            return Err(out_of_range(
                "edge_penalty_factor",
                "finite and at least 1",
                self.edge_penalty_factor,
            ));
        }
        for (field, value) in [
            ("buffer_factor", self.buffer_factor),
            ("offset_factor", self.offset_factor),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(out_of_range(field, "positive and finite", value));
            }
        }
        if self.max_detour_passes == 0 {
            return Err(out_of_range("max_detour_passes", "at least 1", 0.0));
        }
        Ok(())
    }
}

pub struct RoutePlanner {
    registry: Arc<ObstacleRegistry>,
    graph: Option<Arc<RoadGraph>>,
    remote: Option<Arc<dyn RemoteRoutingService>>,
    config: PlannerConfig,
}

impl RoutePlanner {
    pub fn new(
        registry: Arc<ObstacleRegistry>,
        config: PlannerConfig,
    ) -> Result<Self, InvalidInputError> {
        config.validate()?;
        Ok(Self {
            registry,
            graph: None,
            remote: None,
            config,
        })
    }

    pub fn with_graph(mut self, graph: Arc<RoadGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteRoutingService>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ObstacleRegistry> {
        &self.registry
    }

    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Route from `start` through `waypoints` to `end`.
    pub fn route(
        &self,
        start: GeoPoint,
        end: GeoPoint,
        waypoints: &[GeoPoint],
    ) -> Result<RouteResult, RouteError> {
        let span = info_span!("route", waypoints = waypoints.len());
        let _entered = span.enter();

        let points: Vec<GeoPoint> = iter::once(start)
            .chain(waypoints.iter().copied())
            .chain(iter::once(end))
            .collect();
        let result = match &self.graph {
            Some(graph) => self.graph_route(graph, &points, RouteSource::Graph),
            None => Ok(self.remote_or_direct(&points)),
        };
        record(result.as_ref());
        result
    }

    /// Route from `current` to `destination` avoiding every registered obstacle.
    ///
    /// Obstacles are read once up front; changes made while planning are not seen.
    pub fn reroute(
        &self,
        current: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteResult, RouteError> {
        let obstacles = self.registry.list();
        if obstacles.is_empty() {
            return self.route(current, destination, &[]);
        }

        let span = info_span!("reroute", obstacles = obstacles.len());
        let _entered = span.enter();

        if let Some(graph) = &self.graph {
            let (penalized, count) = graph.penalized(&obstacles, self.config.edge_penalty_factor);
            debug!("Rerouting over graph with {count} penalized edges");
            match self.graph_route(&penalized, &[current, destination], RouteSource::PenalizedGraph)
            {
                Ok(result) => {
                    record(Ok(&result));
                    return Ok(result);
                }
                Err(err) => {
                    warn!("Penalized graph has no path ({err}); synthesizing detour waypoints");
                    counter!("routing_reroute_fallbacks_total").increment(1);
                }
            }
        }

        let result = self.detour(current, destination, &obstacles);
        record(result.as_ref());
        result
    }

    /// Straight polyline through `points` with haversine distance.
    pub fn direct_route(&self, points: &[GeoPoint]) -> RouteResult {
        let distance_m = polyline_length_m(points);
        RouteResult {
            coordinates: points.to_vec(),
            distance_m,
            duration_s: self.duration_s(distance_m),
            source: RouteSource::Direct,
        }
    }

    fn duration_s(&self, distance_m: f64) -> f64 {
        distance_m / (self.config.average_speed_kmh * 1_000.0 / 3_600.0)
    }

    /// Legs between consecutive snapped points. A leg without a path is skipped and
    /// the next leg starts from the last node reached.
    fn graph_route(
        &self,
        graph: &RoadGraph,
        points: &[GeoPoint],
        source: RouteSource,
    ) -> Result<RouteResult, RouteError> {
        let nodes: Vec<NodeId> = points
            .iter()
            .map(|p| graph.nearest_node(*p))
            .collect::<Option<_>>()
            .ok_or_else(|| RouteError::NoRouteFound("road graph has no nodes".into()))?;
        let last_leg = nodes.len() - 1;

        let mut path: Vec<NodeId> = Vec::new();
        let mut legs_found = 0;
        let mut from = nodes[0];
        for (leg, &to) in nodes.iter().enumerate().skip(1) {
            match graph.shortest_path(from, to) {
                Some(leg_path) => {
                    for node in leg_path {
                        if path.last() != Some(&node) {
                            path.push(node);
                        }
                    }
                    legs_found += 1;
                    from = to;
                }
                None if leg == last_leg => warn!("No path from node {from} to the destination"),
                None => warn!("No path to waypoint {leg}; skipping it"),
            }
        }
        if legs_found == 0 {
            return Err(RouteError::NoRouteFound(format!(
                "no graph path between {} and {}",
                points[0], points[last_leg]
            )));
        }

        let mut coordinates: Vec<GeoPoint> = path
            .iter()
            .filter_map(|id| graph.node_position(*id))
            .collect();
        if coordinates.len() < 2 {
            // Both ends snapped to the same node.
            coordinates.insert(0, points[0]);
            coordinates.push(points[last_leg]);
        }

        let distance_m = polyline_length_m(&coordinates);
        Ok(RouteResult {
            coordinates,
            distance_m,
            duration_s: self.duration_s(distance_m),
            source,
        })
    }

    fn remote_or_direct(&self, points: &[GeoPoint]) -> RouteResult {
        if let Some(remote) = &self.remote {
            match remote.route(points) {
                Ok(route) => {
                    return RouteResult {
                        coordinates: route.coordinates,
                        distance_m: route.distance_m,
                        duration_s: route.duration_s,
                        source: RouteSource::Remote,
                    };
                }
                Err(err) => {
                    warn!("Remote routing failed; using direct route: {err}");
                    counter!("routing_remote_failures_total").increment(1);
                }
            }
        }
        self.direct_route(points)
    }

    /// Insert avoidance waypoints until the straight polyline clears every buffer.
    fn detour(
        &self,
        start: GeoPoint,
        end: GeoPoint,
        obstacles: &[Obstacle],
    ) -> Result<RouteResult, RouteError> {
        if let Some(blocking) = obstacles
            .iter()
            .find(|o| o.contains(start) || o.contains(end))
        {
            return Err(RouteError::NoRouteFound(format!(
                "route endpoint lies inside obstacle {}",
                blocking.id
            )));
        }

        let mut points = vec![start, end];
        for pass in 0..self.config.max_detour_passes {
            let inserted = self.insert_avoidance_waypoints(&mut points, obstacles);
            if inserted == 0 {
                break;
            }
            debug!("Detour pass {pass} inserted {inserted} waypoints");
        }
        if let Some(obstacle) = first_violation(&points, obstacles) {
            return Err(RouteError::NoRouteFound(format!(
                "could not route around obstacle {} in {} passes",
                obstacle.id, self.config.max_detour_passes
            )));
        }
        if points.len() == 2 {
            return Ok(self.direct_route(&points));
        }

        let waypoints = &points[1..points.len() - 1];
        debug!("Replanning through {} avoidance waypoints", waypoints.len());
        let planned = self.remote_or_direct(&points);
        let mut result = if first_violation(&planned.coordinates, obstacles).is_none() {
            planned
        } else {
            warn!("Remote detour still crosses an obstacle; using waypoint polyline");
            self.direct_route(&points)
        };
        result.source = RouteSource::Detour;
        Ok(result)
    }

    /// One pass over every segment; returns how many waypoints were added.
    fn insert_avoidance_waypoints(&self, points: &mut Vec<GeoPoint>, obstacles: &[Obstacle]) -> usize {
        let mut rebuilt = Vec::with_capacity(points.len() * 2);
        let mut inserted = 0;

        for segment in points.windows(2) {
            let (a, b) = (segment[0], segment[1]);
            rebuilt.push(a);

            let mut detours: Vec<(f64, GeoPoint)> = obstacles
                .iter()
                .filter_map(|obstacle| {
                    let projection = project_onto_segment(obstacle.position, a, b);
                    (projection.distance_sq < obstacle.buffer_deg().powi(2))
                        .then(|| (projection.t, self.avoidance_waypoint(obstacle, a, b, projection)))
                })
                .collect();
            detours.sort_by(|x, y| x.0.total_cmp(&y.0));
            inserted += detours.len();
            rebuilt.extend(detours.into_iter().map(|(_, waypoint)| waypoint));
        }
        if let Some(&last) = points.last() {
            rebuilt.push(last);
        }

        *points = rebuilt;
        inserted
    }

    /// Push the path past the obstacle on the far side of the segment.
    fn avoidance_waypoint(
        &self,
        obstacle: &Obstacle,
        a: GeoPoint,
        b: GeoPoint,
        projection: SegmentProjection,
    ) -> GeoPoint {
        let offset = meters_to_degrees(obstacle.size_m * self.config.buffer_factor)
            * self.config.offset_factor;

        let away = (
            obstacle.position.lat - projection.point.lat,
            obstacle.position.lon - projection.point.lon,
        );
        let away_len = away.0.hypot(away.1);
        let direction = if away_len > f64::EPSILON {
            (away.0 / away_len, away.1 / away_len)
        } else {
            // Obstacle sits on the segment: step off along its normal.
            let seg = (b.lat - a.lat, b.lon - a.lon);
            let seg_len = seg.0.hypot(seg.1);
            if seg_len > f64::EPSILON {
                (-seg.1 / seg_len, seg.0 / seg_len)
            } else {
                (1.0, 0.0)
            }
        };
        obstacle
            .position
            .offset_deg(-direction.0 * offset, -direction.1 * offset)
    }
}

/// First obstacle whose buffer some segment of `points` enters.
fn first_violation<'a>(points: &[GeoPoint], obstacles: &'a [Obstacle]) -> Option<&'a Obstacle> {
    obstacles.iter().find(|obstacle| {
        let buffer_sq = obstacle.buffer_deg().powi(2);
        points.windows(2).any(|seg| {
            project_onto_segment(obstacle.position, seg[0], seg[1]).distance_sq < buffer_sq
        })
    })
}

fn record(result: Result<&RouteResult, &RouteError>) {
    match result {
        Ok(route) => counter!("routing_routes_total", "source" => route.source.label()).increment(1),
        Err(_) => counter!("routing_no_route_total").increment(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn planner() -> RoutePlanner {
        RoutePlanner::new(Arc::new(ObstacleRegistry::new()), PlannerConfig::default()).unwrap()
    }

    #[test]
    fn rejects_degenerate_settings() {
        let registry = Arc::new(ObstacleRegistry::new());
        let invalid = [
            PlannerConfig {
                average_speed_kmh: 0.0,
                ..PlannerConfig::default()
            },
            PlannerConfig {
                average_speed_kmh: f64::INFINITY,
                ..PlannerConfig::default()
            },
            PlannerConfig {
                edge_penalty_factor: -5.0,
                ..PlannerConfig::default()
            },
            PlannerConfig {
                edge_penalty_factor: f64::NAN,
                ..PlannerConfig::default()
            },
            PlannerConfig {
                offset_factor: 0.0,
                ..PlannerConfig::default()
            },
            PlannerConfig {
                max_detour_passes: 0,
                ..PlannerConfig::default()
            },
        ];
        for config in invalid {
            assert!(matches!(
                RoutePlanner::new(Arc::clone(&registry), config.clone()),
                Err(InvalidInputError::OutOfRange { .. })
            ), "{config:?} was accepted");
        }

        let no_penalty = PlannerConfig {
            edge_penalty_factor: 1.0,
            ..PlannerConfig::default()
        };
        assert!(RoutePlanner::new(registry, no_penalty).is_ok());
    }

    #[test]
    fn waypoint_lands_beyond_segment_opposite_the_obstacle() {
        let planner = planner();
        let id = planner.registry.add(point(0.00001, 0.0005), 5.0).unwrap();
        let obstacle = planner.registry.get(&id).unwrap();
        let (a, b) = (point(0.0, 0.0), point(0.0, 0.001));
        let projection = project_onto_segment(obstacle.position, a, b);

        let waypoint = planner.avoidance_waypoint(&obstacle, a, b, projection);
        assert_relative_eq!(waypoint.lon, 0.0005, epsilon = 1e-12);
        assert_relative_eq!(waypoint.lat, 0.00001 - 20.0 / 111_000.0, epsilon = 1e-12);
    }

    #[test]
    fn obstacle_on_segment_uses_normal() {
        let planner = planner();
        let id = planner.registry.add(point(0.0, 0.0005), 5.0).unwrap();
        let obstacle = planner.registry.get(&id).unwrap();
        let (a, b) = (point(0.0, 0.0), point(0.0, 0.001));
        let projection = project_onto_segment(obstacle.position, a, b);

        let waypoint = planner.avoidance_waypoint(&obstacle, a, b, projection);
        assert_relative_eq!(waypoint.lat.abs(), 20.0 / 111_000.0, epsilon = 1e-12);
        assert_relative_eq!(waypoint.lon, 0.0005, epsilon = 1e-12);
    }

    #[test]
    fn waypoints_follow_segment_order() {
        let planner = planner();
        planner.registry.add(point(0.0, 0.0008), 5.0).unwrap();
        planner.registry.add(point(0.0, 0.0002), 5.0).unwrap();
        let obstacles = planner.registry.list();

        let mut points = vec![point(0.0, 0.0), point(0.0, 0.001)];
        assert_eq!(planner.insert_avoidance_waypoints(&mut points, &obstacles), 2);
        assert_eq!(points.len(), 4);
        assert!(points[1].lon < points[2].lon);
        assert!(first_violation(&points, &obstacles).is_none());
    }

    #[test]
    fn duration_uses_average_speed() {
        let planner = planner();
        assert_relative_eq!(planner.duration_s(30_000.0), 3_600.0);
    }
}
