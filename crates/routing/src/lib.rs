//! Obstacle-aware route planning.
//!
//! The [`RoutePlanner`] answers route queries over an optional [`RoadGraph`], an optional
//! [`RemoteRoutingService`], and a straight-line fallback, and re-plans around obstacles
//! held in an [`ObstacleRegistry`].

pub mod error;
pub mod graph;
pub mod guidance;
pub mod planner;
pub mod registry;
pub mod remote;

pub use error::{GraphError, RemoteRoutingError, RouteError};
pub use graph::{GraphEdge, GraphNode, NodeId, RoadGraph};
pub use guidance::{Instruction, TurnDirection, instructions};
pub use planner::{PlannerConfig, RoutePlanner, RouteResult, RouteSource};
pub use registry::{DEFAULT_OBSTACLE_SIZE_M, Obstacle, ObstacleId, ObstacleRegistry};
pub use remote::{DEFAULT_ORS_URL, OpenRouteServiceClient, RemoteRoute, RemoteRoutingService};
