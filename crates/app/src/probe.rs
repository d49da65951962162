//! Capture health check: runs the detection pipeline over ffmpeg without a model.

use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Result, bail};
use ml_core::{InferenceDetection, InferenceError};
use tracing::{info, warn};
use video_ingest::{FfmpegOpener, Frame};
use vision::{DetectionPipeline, PipelineConfig, PipelineExit, PipelineState};

use crate::cli::ProbeArgs;

pub fn run(args: ProbeArgs) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let config = PipelineConfig::try_from(&args.pipeline)?;
    let mut opener = FfmpegOpener::new(config.capture_size);
    opener.program = args.ffmpeg.clone();

    let no_model = |_: &Frame| -> Result<Vec<InferenceDetection>, InferenceError> { Ok(Vec::new()) };
    let pipeline = DetectionPipeline::new(Arc::new(opener), Box::new(no_model), config)?;
    pipeline.start(&args.source, args.pipeline.location)?;

    let report_every = Duration::from_millis(args.report_interval_ms.max(10));
    loop {
        thread::sleep(report_every);
        let status = pipeline.status();
        info!(
            "state={:?} frames={} capture_age_ms={:?}",
            status.state, status.health.frames_captured, status.health.capture_age_ms
        );

        if let Some(component) = status.stale_component {
            warn!("No {} heartbeat for over the staleness window", component.label());
        }

        if status.state == PipelineState::Stopped {
            if let Some(PipelineExit::ReconnectExhausted { uri, attempts }) = status.last_exit {
                bail!("source {uri} gave no frames after {attempts} reconnect attempts");
            }
            break;
        }
        if args
            .frames
            .is_some_and(|limit| status.health.frames_captured >= limit)
        {
            info!("Captured {} frames", status.health.frames_captured);
            break;
        }
        if shutdown.load(Ordering::SeqCst) {
            info!("Interrupted");
            break;
        }
    }

    pipeline.stop();
    Ok(())
}
