//! Stage-callback trait for per-request progress events.
//!
//! The bot edits its "processing…" chat message as a request moves through
//! the pipeline. Rather than teaching the pipeline about chat messages, the
//! pipeline reports abstract stage transitions through this trait and the
//! Telegram layer decides how to surface them.
//!
//! # Why callbacks instead of channels?
//!
//! A callback is the least-invasive integration point: callers can forward
//! events to a chat message edit, a tracing span, or a test recorder without
//! the pipeline knowing anything about the host application. The trait is
//! `Send + Sync` because enhancement batches run concurrently.

use std::sync::Arc;

/// The pipeline stages a request passes through, in order.
///
/// `Enhancing` is skipped when no LLM provider is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Attachment fetched; uploading to the conversion vendor.
    Uploading,
    /// Vendor job created; polling until it reaches a terminal state.
    Converting,
    /// Workbook downloaded; substitution and LLM repair in progress.
    Enhancing,
    /// Result assembled; sending the document back.
    Finalizing,
}

/// Called by the request pipeline as it enters each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait StageCallback: Send + Sync {
    /// Called once when the pipeline enters `stage`.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when one enhancement batch completes (successfully or not).
    fn on_batch_done(&self, done: usize, total: usize) {
        let _ = (done, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopStageCallback;

impl StageCallback for NoopStageCallback {}

/// Convenience alias matching the type threaded through the pipeline.
pub type StageEvents = Arc<dyn StageCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recorder {
        stages: Mutex<Vec<Stage>>,
        batches: AtomicUsize,
    }

    impl StageCallback for Recorder {
        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }
        fn on_batch_done(&self, _done: usize, _total: usize) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopStageCallback;
        cb.on_stage(Stage::Uploading);
        cb.on_batch_done(1, 4);
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder {
            stages: Mutex::new(Vec::new()),
            batches: AtomicUsize::new(0),
        };
        rec.on_stage(Stage::Uploading);
        rec.on_stage(Stage::Converting);
        rec.on_stage(Stage::Finalizing);
        rec.on_batch_done(1, 2);
        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![Stage::Uploading, Stage::Converting, Stage::Finalizing]
        );
        assert_eq!(rec.batches.load(Ordering::SeqCst), 1);
    }
}
