//! Heartbeats and counters for the detection worker, surfaced through `status()`.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthComponent {
    Capture,
    Inference,
}

impl HealthComponent {
    pub fn label(self) -> &'static str {
        match self {
            HealthComponent::Capture => "capture",
            HealthComponent::Inference => "inference",
        }
    }
}

/// Snapshot of [`PipelineHealth`]. Ages are `None` until the first beat.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub capture_age_ms: Option<u64>,
    pub inference_age_ms: Option<u64>,
    pub frames_captured: u64,
    pub frames_inferred: u64,
    pub inference_failures: u64,
}

/// Last-beat timestamps are unix millis; zero means never.
#[derive(Default)]
pub(crate) struct PipelineHealth {
    capture: AtomicU64,
    inference: AtomicU64,
    frames_captured: AtomicU64,
    frames_inferred: AtomicU64,
    inference_failures: AtomicU64,
}

impl PipelineHealth {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn beat(&self, component: HealthComponent) {
        let now = current_millis();
        match component {
            HealthComponent::Capture => {
                self.capture.store(now, Ordering::Relaxed);
                self.frames_captured.fetch_add(1, Ordering::Relaxed);
            }
            HealthComponent::Inference => {
                self.inference.store(now, Ordering::Relaxed);
                self.frames_inferred.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter; called when a new run starts.
    pub(crate) fn reset(&self) {
        for cell in [
            &self.capture,
            &self.inference,
            &self.frames_captured,
            &self.frames_inferred,
            &self.inference_failures,
        ] {
            cell.store(0, Ordering::Relaxed);
        }
    }

    /// First component whose last beat is older than `threshold_ms`, ignoring
    /// components that never beat.
    pub(crate) fn stale_component(&self, now: u64, threshold_ms: u64) -> Option<HealthComponent> {
        [
            (HealthComponent::Capture, &self.capture),
            (HealthComponent::Inference, &self.inference),
        ]
        .into_iter()
        .find(|(_, last)| {
            let last = last.load(Ordering::Relaxed);
            last != 0 && now.saturating_sub(last) > threshold_ms
        })
        .map(|(component, _)| component)
    }

    pub(crate) fn report(&self, now: u64) -> HealthReport {
        let age = |cell: &AtomicU64| match cell.load(Ordering::Relaxed) {
            0 => None,
            last => Some(now.saturating_sub(last)),
        };
        HealthReport {
            capture_age_ms: age(&self.capture),
            inference_age_ms: age(&self.inference),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_inferred: self.frames_inferred.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
