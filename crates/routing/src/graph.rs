//! Road graph with length-weighted shortest paths.
//!
//! Nodes carry coordinates, edges carry a physical length, an optional polyline
//! geometry, and a search weight. The weight starts equal to the length; obstacle
//! avoidance works on a [`RoadGraph::penalized`] copy so the loaded graph never changes.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    fs,
    path::Path,
};

use nav_geo::{GeoPoint, distance_sq_to_segment, haversine_m, polyline_length_m};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{error::GraphError, registry::Obstacle};

pub type NodeId = u64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub position: GeoPoint,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub length_m: f64,
    /// At least two points, starting at `from` and ending at `to`.
    pub geometry: Vec<GeoPoint>,
    pub weight: f64,
}

impl GraphEdge {
    /// Whether any part of the geometry comes within the obstacle's buffer.
    fn passes_near(&self, obstacle: &Obstacle) -> bool {
        let buffer_sq = obstacle.buffer_deg().powi(2);
        self.geometry
            .windows(2)
            .any(|seg| distance_sq_to_segment(obstacle.position, seg[0], seg[1]) < buffer_sq)
    }
}

#[derive(Clone, Debug, Default)]
pub struct RoadGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<NodeId, usize>,
    edges: Vec<GraphEdge>,
    /// Outgoing edge indices per node index.
    adjacency: Vec<Vec<usize>>,
}

#[derive(Deserialize)]
struct GraphFile {
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
}

#[derive(Deserialize)]
struct NodeRecord {
    id: NodeId,
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct EdgeRecord {
    from: NodeId,
    to: NodeId,
    #[serde(default)]
    length: Option<f64>,
    #[serde(default)]
    geometry: Vec<GeoPoint>,
    #[serde(default)]
    oneway: bool,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let graph = Self::from_json_str(&text)?;
        info!(
            "Road graph loaded from {} with {} nodes and {} edges",
            path.display(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Parse `{nodes:[{id,lat,lon}], edges:[{from,to,length?,geometry?,oneway?}]}`.
    pub fn from_json_str(text: &str) -> Result<Self, GraphError> {
        let file: GraphFile = serde_json::from_str(text)?;
        let mut graph = Self::new();
        for node in file.nodes {
            graph.add_node(node.id, GeoPoint::new(node.lat, node.lon)?)?;
        }
        for edge in file.edges {
            graph.add_edge(edge.from, edge.to, edge.length, edge.geometry, edge.oneway)?;
        }
        Ok(graph)
    }

    pub fn add_node(&mut self, id: NodeId, position: GeoPoint) -> Result<(), GraphError> {
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.index.insert(id, self.nodes.len());
        self.nodes.push(GraphNode { id, position });
        self.adjacency.push(Vec::new());
        Ok(())
    }

    /// Add a road between two known nodes; two-way unless `oneway`.
    ///
    /// An empty `geometry` becomes the straight segment between the nodes, and a missing
    /// `length` is measured along the geometry.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        length_m: Option<f64>,
        geometry: Vec<GeoPoint>,
        oneway: bool,
    ) -> Result<(), GraphError> {
        let from_pos = self.node_position(from).ok_or(GraphError::UnknownNode(from))?;
        let to_pos = self.node_position(to).ok_or(GraphError::UnknownNode(to))?;

        let geometry = if geometry.len() < 2 {
            vec![from_pos, to_pos]
        } else {
            geometry
        };
        let length_m = length_m.unwrap_or_else(|| polyline_length_m(&geometry));
        if !length_m.is_finite() || length_m < 0.0 {
            return Err(GraphError::InvalidLength {
                from,
                to,
                length: length_m,
            });
        }

        if !oneway {
            let mut reversed = geometry.clone();
            reversed.reverse();
            self.push_edge(to, from, length_m, reversed);
        }
        self.push_edge(from, to, length_m, geometry);
        Ok(())
    }

    fn push_edge(&mut self, from: NodeId, to: NodeId, length_m: f64, geometry: Vec<GeoPoint>) {
        let Some(&from_idx) = self.index.get(&from) else {
            return;
        };
        self.adjacency[from_idx].push(self.edges.len());
        self.edges.push(GraphEdge {
            from,
            to,
            length_m,
            geometry,
            weight: length_m,
        });
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node_position(&self, id: NodeId) -> Option<GeoPoint> {
        self.index.get(&id).map(|&idx| self.nodes[idx].position)
    }

    /// Node closest to `point` by great-circle distance; ties go to the first added.
    pub fn nearest_node(&self, point: GeoPoint) -> Option<NodeId> {
        self.nodes
            .iter()
            .map(|node| (node.id, haversine_m(point, node.position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Lowest-weight node sequence from `start` to `goal`, both inclusive.
    pub fn shortest_path(&self, start: NodeId, goal: NodeId) -> Option<Vec<NodeId>> {
        let start_idx = *self.index.get(&start)?;
        let goal_idx = *self.index.get(&goal)?;
        if start_idx == goal_idx {
            return Some(vec![start]);
        }

        let mut dist = vec![f64::INFINITY; self.nodes.len()];
        let mut prev: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut heap = BinaryHeap::new();
        dist[start_idx] = 0.0;
        heap.push(SearchState {
            cost: 0.0,
            node: start_idx,
        });

        while let Some(SearchState { cost, node }) = heap.pop() {
            if node == goal_idx {
                break;
            }
            if cost > dist[node] {
                continue;
            }
            for &edge_idx in &self.adjacency[node] {
                let edge = &self.edges[edge_idx];
                let Some(&next) = self.index.get(&edge.to) else {
                    continue;
                };
                let candidate = cost + edge.weight;
                if candidate < dist[next] {
                    dist[next] = candidate;
                    prev[next] = Some(node);
                    heap.push(SearchState {
                        cost: candidate,
                        node: next,
                    });
                }
            }
        }

        prev[goal_idx]?;
        let mut path = vec![self.nodes[goal_idx].id];
        let mut current = goal_idx;
        while let Some(p) = prev[current] {
            path.push(self.nodes[p].id);
            current = p;
        }
        path.reverse();
        Some(path)
    }

    /// Working copy where every edge passing within any obstacle's buffer has its
    /// weight multiplied by `factor` (once, however many obstacles touch it).
    ///
    /// Returns the copy and the number of penalized edges.
    pub fn penalized(&self, obstacles: &[Obstacle], factor: f64) -> (RoadGraph, usize) {
        let mut copy = self.clone();
        let mut penalized = 0;
        for edge in &mut copy.edges {
            if obstacles.iter().any(|obstacle| edge.passes_near(obstacle)) {
                edge.weight *= factor;
                penalized += 1;
            }
        }
        debug!("Penalized {penalized} of {} edges", copy.edges.len());
        (copy, penalized)
    }
}

#[derive(Clone, Copy, Debug)]
struct SearchState {
    cost: f64,
    node: usize,
}

impl PartialEq for SearchState {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.node == other.node
    }
}

impl Eq for SearchState {}

impl Ord for SearchState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the cheapest state.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for SearchState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;

    use crate::registry::ObstacleRegistry;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    /// 1 - 2 - 4 along the bottom, 1 - 3 - 4 over a longer top detour.
    fn diamond() -> RoadGraph {
        let mut graph = RoadGraph::new();
        graph.add_node(1, point(0.0, 0.0)).unwrap();
        graph.add_node(2, point(0.0, 0.001)).unwrap();
        graph.add_node(3, point(0.001, 0.001)).unwrap();
        graph.add_node(4, point(0.0, 0.002)).unwrap();
        graph.add_edge(1, 2, None, Vec::new(), false).unwrap();
        graph.add_edge(2, 4, None, Vec::new(), false).unwrap();
        graph.add_edge(1, 3, None, Vec::new(), false).unwrap();
        graph.add_edge(3, 4, None, Vec::new(), false).unwrap();
        graph
    }

    #[test]
    fn shortest_path_prefers_lighter_route() {
        let graph = diamond();
        assert_eq!(graph.shortest_path(1, 4), Some(vec![1, 2, 4]));
        assert_eq!(graph.shortest_path(4, 1), Some(vec![4, 2, 1]));
        assert_eq!(graph.shortest_path(2, 2), Some(vec![2]));
        assert_eq!(graph.shortest_path(1, 99), None);
    }

    #[test]
    fn oneway_edges_are_directional() {
        let mut graph = RoadGraph::new();
        graph.add_node(1, point(0.0, 0.0)).unwrap();
        graph.add_node(2, point(0.0, 0.001)).unwrap();
        graph.add_edge(1, 2, Some(10.0), Vec::new(), true).unwrap();
        assert_eq!(graph.shortest_path(1, 2), Some(vec![1, 2]));
        assert_eq!(graph.shortest_path(2, 1), None);
    }

    #[test]
    fn missing_length_is_measured_from_geometry() {
        let graph = diamond();
        let edge = &graph.edges()[0];
        assert_relative_eq!(
            edge.length_m,
            haversine_m(point(0.0, 0.0), point(0.0, 0.001)),
            epsilon = 1e-9
        );
        assert_eq!(edge.weight, edge.length_m);
    }

    #[test]
    fn nearest_node_by_distance() {
        let graph = diamond();
        assert_eq!(graph.nearest_node(point(0.0009, 0.0011)), Some(3));
        assert_eq!(RoadGraph::new().nearest_node(point(0.0, 0.0)), None);
    }

    #[test]
    fn penalized_copy_diverts_without_touching_original() {
        let graph = diamond();
        let registry = ObstacleRegistry::new();
        registry.add(point(0.0, 0.0015), 5.0).unwrap();
        let obstacles = registry.list();

        let (penalized, count) = graph.penalized(&obstacles, 100.0);
        assert_eq!(count, 2);
        assert_eq!(penalized.shortest_path(1, 4), Some(vec![1, 3, 4]));
        assert_eq!(graph.shortest_path(1, 4), Some(vec![1, 2, 4]));
        assert!(graph.edges().iter().all(|e| e.weight == e.length_m));
    }

    #[test]
    fn penalty_is_not_absolute() {
        let mut graph = RoadGraph::new();
        graph.add_node(1, point(0.0, 0.0)).unwrap();
        graph.add_node(2, point(0.0, 0.001)).unwrap();
        graph.add_edge(1, 2, None, Vec::new(), false).unwrap();
        let obstacle = Obstacle {
            id: "0b7c5a52-3c3b-4b8e-9b0a-2f6a1d2e3f40".parse().unwrap(),
            position: point(0.0, 0.0005),
            size_m: 3.0,
            created_at: Utc::now(),
        };
        let (penalized, count) = graph.penalized(&[obstacle], 100.0);
        assert_eq!(count, 2);
        assert_eq!(penalized.shortest_path(1, 2), Some(vec![1, 2]));
    }

    #[test]
    fn loads_json_with_optional_fields() {
        let graph = RoadGraph::from_json_str(
            r#"{
                "nodes": [
                    {"id": 10, "lat": 10.9028, "lon": 76.9016},
                    {"id": 11, "lat": 10.9038, "lon": 76.9026},
                    {"id": 12, "lat": 10.9048, "lon": 76.9036}
                ],
                "edges": [
                    {"from": 10, "to": 11, "length": 160.0},
                    {"from": 11, "to": 12, "oneway": true,
                     "geometry": [[10.9038, 76.9026], {"lat": 10.9045, "lng": 76.9030}, [10.9048, 76.9036]]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.shortest_path(10, 12), Some(vec![10, 11, 12]));
        assert_eq!(graph.shortest_path(12, 10), None);
    }

    #[test]
    fn rejects_dangling_edges() {
        let err = RoadGraph::from_json_str(
            r#"{"nodes": [{"id": 1, "lat": 0.0, "lon": 0.0}], "edges": [{"from": 1, "to": 2}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode(2)));
    }
}
