//! Progress reporting for long-running pipeline stages.
//!
//! The ingestion and cleaning loops report batch progress through the
//! [`ProgressCallback`] trait so that library crates stay free of any
//! terminal rendering concern. The CLI supplies an `indicatif`-backed
//! implementation; tests use [`NullProgress`].

use std::sync::Arc;

/// Receiver for progress updates from a pipeline stage.
pub trait ProgressCallback: Send + Sync {
    /// Announces the total expected units of work, once known.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Marks the stage as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance for convenient use.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
