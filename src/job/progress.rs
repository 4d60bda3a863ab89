//! Progress aggregation: maps per-stage local progress onto the global
//! 0–100 job percentage and fans updates out to an optional listener.

use crate::job::registry::JobRegistry;
use crate::job::JobStatus;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// Stage-local progress callback carrying 0..=100.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Listener receiving `(status_label, global_pct)` updates.
pub type ProgressListener = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Pipeline stages with their global progress ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcribing,
    Translating,
    Synthesizing,
    Muxing,
    Finalizing,
}

impl Stage {
    /// Global progress range `(start, end)` this stage spans.
    pub fn range(&self) -> (u8, u8) {
        match self {
            Stage::Transcribing => (0, 25),
            Stage::Translating => (25, 50),
            Stage::Synthesizing => (50, 75),
            Stage::Muxing => (75, 95),
            Stage::Finalizing => (95, 100),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Stage::Transcribing => JobStatus::Transcribing,
            Stage::Translating => JobStatus::Translating,
            Stage::Synthesizing => JobStatus::Synthesizing,
            Stage::Muxing => JobStatus::Muxing,
            Stage::Finalizing => JobStatus::Completed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Transcribing => "transcribing",
            Stage::Translating => "translating",
            Stage::Synthesizing => "synthesizing",
            Stage::Muxing => "muxing",
            Stage::Finalizing => "finalizing",
        }
    }
}

/// Per-job progress reporter.
///
/// Global progress is monotone non-decreasing for the life of the job;
/// listener invocations are serialized. Safe to call from any task.
pub struct ProgressAggregator {
    job_id: String,
    registry: Arc<JobRegistry>,
    listener: Option<ProgressListener>,
    current: AtomicU8,
    listener_lock: Mutex<()>,
}

impl ProgressAggregator {
    pub fn new(
        job_id: String,
        registry: Arc<JobRegistry>,
        listener: Option<ProgressListener>,
    ) -> Self {
        Self {
            job_id,
            registry,
            listener,
            current: AtomicU8::new(0),
            listener_lock: Mutex::new(()),
        }
    }

    /// Report a stage's local progress (0..=100).
    pub fn report(&self, stage: Stage, local_pct: u8) {
        let (start, end) = stage.range();
        let local = local_pct.min(100) as u16;
        let global = start as u16 + local * (end - start) as u16 / 100;
        let global = (global as u8).min(100);

        let previous = self.current.fetch_max(global, Ordering::SeqCst);
        let global = global.max(previous);

        self.registry.update(&self.job_id, |job| {
            if global > job.progress {
                job.progress = global;
            }
        });

        if let Some(listener) = &self.listener {
            let _guard = self.listener_lock.lock().unwrap();
            listener(stage.label(), global);
        }
    }

    /// Stage-local callback for handing into a pipeline component.
    pub fn stage_callback(aggregator: &Arc<Self>, stage: Stage) -> ProgressFn {
        let aggregator = Arc::clone(aggregator);
        Arc::new(move |local| aggregator.report(stage, local))
    }

    pub fn current(&self) -> u8 {
        self.current.load(Ordering::SeqCst)
    }
}
