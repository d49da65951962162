use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand};
use nav_geo::{GeoPoint, InvalidInputError};
use routing::{DEFAULT_OBSTACLE_SIZE_M, DEFAULT_ORS_URL};
use vision::PipelineCliArgs;

#[derive(Debug, Parser)]
#[command(name = "navsight", version, about = "Obstacle detection and obstacle-aware routing")]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long = "log", value_name = "FILTER", default_value = "info", global = true)]
    pub log_filter: String,
    /// Print Prometheus metrics after the command finishes.
    #[arg(long = "metrics", global = true, action = clap::ArgAction::SetTrue)]
    pub dump_metrics: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Plan a route, optionally around obstacles.
    Route(RouteArgs),
    /// Open a video source and report capture health.
    Probe(ProbeArgs),
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    #[arg(long, value_name = "LAT,LON")]
    pub from: GeoPoint,
    #[arg(long, value_name = "LAT,LON")]
    pub to: GeoPoint,
    /// Intermediate point; repeatable.
    #[arg(long = "via", value_name = "LAT,LON")]
    pub via: Vec<GeoPoint>,
    /// Road graph JSON file.
    #[arg(long, value_name = "FILE")]
    pub graph: Option<PathBuf>,
    /// Obstacle to register before planning; repeatable. Size defaults to 1 m.
    #[arg(long = "obstacle", value_name = "LAT,LON[,SIZE]")]
    pub obstacles: Vec<ObstacleSpec>,
    /// Plan around registered obstacles instead of a plain route.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub reroute: bool,
    /// OpenRouteService API key; remote routing is off without one.
    #[arg(long = "ors-key", env = "OPENROUTE_API_KEY", hide_env_values = true)]
    pub ors_key: Option<String>,
    #[arg(long = "ors-url", value_name = "URL", default_value = DEFAULT_ORS_URL)]
    pub ors_url: String,
    #[arg(long = "ors-timeout-ms", value_name = "MS", default_value_t = 10_000)]
    pub ors_timeout_ms: u64,
    /// Average speed used for duration estimates.
    #[arg(long = "speed", value_name = "KMH", default_value_t = 30.0)]
    pub speed_kmh: f64,
    /// Weight multiplier for graph edges near obstacles.
    #[arg(long = "edge-penalty", value_name = "FACTOR", default_value_t = 100.0)]
    pub edge_penalty: f64,
    #[arg(long = "max-detour-passes", value_name = "N", default_value_t = 3)]
    pub max_detour_passes: u32,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Device index, /dev/videoN, stream URL, or file path.
    #[arg(long, value_name = "URI")]
    pub source: String,
    /// Stop after this many frames.
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,
    #[arg(long = "ffmpeg", value_name = "PATH", default_value = "ffmpeg")]
    pub ffmpeg: String,
    #[arg(long = "report-interval-ms", value_name = "MS", default_value_t = 1_000)]
    pub report_interval_ms: u64,
    #[command(flatten)]
    pub pipeline: PipelineCliArgs,
}

/// `LAT,LON[,SIZE]` obstacle on the command line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObstacleSpec {
    pub position: GeoPoint,
    pub size_m: f64,
}

impl FromStr for ObstacleSpec {
    type Err = InvalidInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let (position, size) = match parts.as_slice() {
            [lat, lon] => (format!("{lat},{lon}"), None),
            [lat, lon, size] => (format!("{lat},{lon}"), Some(*size)),
            _ => return Err(InvalidInputError::Malformed(s.to_string())),
        };
        let size_m = match size {
            Some(size) => size
                .parse::<f64>()
                .map_err(|_| InvalidInputError::Malformed(s.to_string()))?,
            None => DEFAULT_OBSTACLE_SIZE_M,
        };
        Ok(Self {
            position: position.parse()?,
            size_m,
        })
    }
}
