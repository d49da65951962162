//! Configuration for the detection pipeline.
//!
//! `PipelineCliArgs` is the flag surface used by the `navsight probe` subcommand; it is
//! translated into a validated `PipelineConfig` which the pipeline keeps for its lifetime.

use std::time::Duration;

use clap::Args;
use nav_geo::{GeoPoint, GeoProjector};
use video_ingest::ReconnectPolicy;

use crate::{
    classify::{DistanceEstimator, ObstacleClasses},
    pipeline::PipelineError,
};

#[derive(Clone, Debug)]
/// Tunables shared by the detection worker.
pub struct PipelineConfig {
    /// Detections scoring below this are never published.
    pub confidence_threshold: f32,
    /// Run inference on every Nth captured frame.
    pub inference_interval: u32,
    /// Size requested from the capture backend.
    pub capture_size: (u32, u32),
    /// Camera model used for pixel → geo projection.
    pub projector: GeoProjector,
    pub obstacle_classes: ObstacleClasses,
    pub distance: DistanceEstimator,
    pub reconnect: ReconnectPolicy,
    /// Pause after a read that produced no frame.
    pub transient_retry_delay: Duration,
    /// How long `stop` waits for the worker before giving up on it.
    pub join_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            inference_interval: 3,
            capture_size: (640, 480),
            projector: GeoProjector::default(),
            obstacle_classes: ObstacleClasses::default(),
            distance: DistanceEstimator::default(),
            reconnect: ReconnectPolicy::default(),
            transient_retry_delay: Duration::from_millis(100),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return invalid("confidence threshold must be within [0, 1]");
        }
        if self.inference_interval == 0 {
            return invalid("inference interval must be at least 1");
        }
        if self.capture_size.0 == 0 || self.capture_size.1 == 0 {
            return invalid("capture width and height must be positive");
        }
        let fov = self.projector.field_of_view_deg;
        if !fov.is_finite() || fov <= 0.0 || fov >= 180.0 {
            return invalid("field of view must be within (0, 180) degrees");
        }
        if !self.projector.max_range_m.is_finite() || self.projector.max_range_m <= 0.0 {
            return invalid("max range must be positive");
        }
        if !self.distance.focal_length_px.is_finite() || self.distance.focal_length_px <= 0.0 {
            return invalid("focal length must be positive");
        }
        if self.reconnect.max_attempts == 0 {
            return invalid("reconnect attempts must be at least 1");
        }
        if self.reconnect.poll_interval.is_zero() {
            return invalid("poll interval must be non-zero");
        }
        Ok(())
    }
}

/// CLI arguments accepted by the `probe` subcommand.
#[derive(Debug, Args)]
pub struct PipelineCliArgs {
    /// Minimum detection confidence (0-1).
    #[arg(long = "confidence", value_name = "SCORE", default_value_t = 0.5)]
    pub confidence: f32,
    /// Run inference on every Nth frame.
    #[arg(long = "inference-interval", value_name = "N", default_value_t = 3)]
    pub inference_interval: u32,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX", default_value_t = 640)]
    pub width: u32,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX", default_value_t = 480)]
    pub height: u32,
    /// Horizontal camera field of view in degrees.
    #[arg(long = "fov", value_name = "DEG", default_value_t = 60.0)]
    pub fov_deg: f64,
    /// Distance mapped to the bottom-to-middle span of the frame.
    #[arg(long = "range", value_name = "METERS", default_value_t = 30.0)]
    pub range_m: f64,
    /// Focal length used for distance estimation.
    #[arg(long = "focal-length", value_name = "PX", default_value_t = 800.0)]
    pub focal_length_px: f32,
    /// Initial device location; enables geo projection.
    #[arg(long = "location", value_name = "LAT,LON")]
    pub location: Option<GeoPoint>,
    /// Silence before a reconnect is attempted.
    #[arg(long = "stale-after-ms", value_name = "MS", default_value_t = 5_000)]
    pub stale_after_ms: u64,
    /// Reconnect attempts before the pipeline gives up.
    #[arg(long = "max-reconnects", value_name = "N", default_value_t = 5)]
    pub max_reconnects: u32,
    /// Pause after each reconnect attempt.
    #[arg(long = "reconnect-delay-ms", value_name = "MS", default_value_t = 2_000)]
    pub reconnect_delay_ms: u64,
    /// How long stop waits for the worker thread.
    #[arg(long = "join-timeout-ms", value_name = "MS", default_value_t = 5_000)]
    pub join_timeout_ms: u64,
}

impl TryFrom<&PipelineCliArgs> for PipelineConfig {
    type Error = PipelineError;

    fn try_from(args: &PipelineCliArgs) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        let config = Self {
            confidence_threshold: args.confidence,
            inference_interval: args.inference_interval,
            capture_size: (args.width, args.height),
            projector: GeoProjector {
                field_of_view_deg: args.fov_deg,
                max_range_m: args.range_m,
            },
            distance: DistanceEstimator::new(args.focal_length_px),
            reconnect: ReconnectPolicy {
                stale_after: Duration::from_millis(args.stale_after_ms),
                max_attempts: args.max_reconnects,
                retry_delay: Duration::from_millis(args.reconnect_delay_ms),
                ..defaults.reconnect
            },
            join_timeout: Duration::from_millis(args.join_timeout_ms),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        pipeline: PipelineCliArgs,
    }

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn cli_defaults_match_config_defaults() {
        let args = Harness::parse_from(["probe"]).pipeline;
        let config = PipelineConfig::try_from(&args).unwrap();
        let defaults = PipelineConfig::default();
        assert_eq!(config.confidence_threshold, defaults.confidence_threshold);
        assert_eq!(config.inference_interval, defaults.inference_interval);
        assert_eq!(config.reconnect, defaults.reconnect);
        assert_eq!(config.projector, defaults.projector);
        assert_eq!(config.join_timeout, defaults.join_timeout);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let args = Harness::parse_from(["probe", "--confidence", "1.5"]).pipeline;
        assert!(matches!(
            PipelineConfig::try_from(&args),
            Err(PipelineError::InvalidConfig(_))
        ));

        let args = Harness::parse_from(["probe", "--inference-interval", "0"]).pipeline;
        assert!(PipelineConfig::try_from(&args).is_err());

        let args = Harness::parse_from(["probe", "--fov", "200"]).pipeline;
        assert!(PipelineConfig::try_from(&args).is_err());
    }

    #[test]
    fn location_flag_parses() {
        let args = Harness::parse_from(["probe", "--location", "10.9,76.9"]).pipeline;
        let location = args.location.unwrap();
        assert_eq!((location.lat, location.lon), (10.9, 76.9));
    }
}
