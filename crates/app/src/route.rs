use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use routing::{
    ObstacleRegistry, OpenRouteServiceClient, PlannerConfig, RoadGraph, RoutePlanner, instructions,
};
use tracing::{info, warn};

use crate::cli::RouteArgs;

pub fn run(args: RouteArgs) -> Result<()> {
    let registry = Arc::new(ObstacleRegistry::new());
    for obstacle in &args.obstacles {
        registry
            .add(obstacle.position, obstacle.size_m)
            .with_context(|| format!("invalid obstacle at {}", obstacle.position))?;
    }

    let config = PlannerConfig {
        average_speed_kmh: args.speed_kmh,
        edge_penalty_factor: args.edge_penalty,
        max_detour_passes: args.max_detour_passes,
        ..PlannerConfig::default()
    };
    let mut planner = RoutePlanner::new(registry, config).context("invalid planner settings")?;

    if let Some(path) = &args.graph {
        let graph = RoadGraph::from_path(path)
            .with_context(|| format!("failed to load road graph {}", path.display()))?;
        planner = planner.with_graph(Arc::new(graph));
    }
    match &args.ors_key {
        Some(key) if !key.is_empty() => {
            let client = OpenRouteServiceClient::new(
                args.ors_url.as_str(),
                key.as_str(),
                Duration::from_millis(args.ors_timeout_ms),
            )
            .context("failed to build routing client")?;
            info!("Remote routing via {}", client.endpoint());
            planner = planner.with_remote(Arc::new(client));
        }
        _ if !planner.has_graph() => {
            warn!("No road graph or routing key; routes will be straight lines")
        }
        _ => {}
    }

    let result = if args.reroute {
        planner.reroute(args.from, args.to)?
    } else {
        planner.route(args.from, args.to, &args.via)?
    };
    info!(
        "Route from {:?}: {} points, {:.0} m, {:.0} s",
        result.source,
        result.coordinates.len(),
        result.distance_m,
        result.duration_s
    );

    println!("{}", serde_json::to_string_pretty(&result)?);
    for (step, instruction) in instructions(&result).iter().enumerate() {
        println!("{:>3}. {}", step + 1, instruction.text);
    }
    Ok(())
}
