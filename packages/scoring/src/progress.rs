//! Per-incident progress events from the batch pipelines.
//!
//! The pipelines only emit events; rendering is up to the caller (the CLI
//! draws an `indicatif` bar, library callers pass [`NullProgress`]).

/// Observer of a scoring batch.
///
/// Events may arrive from rayon workers, so implementations must be
/// `Send + Sync`.
pub trait ScoringProgress: Send + Sync {
    /// Called once, before any incident is handled.
    fn begin(&self, incidents: usize);

    /// One incident handled. `scored` is `false` when it was skipped for
    /// lack of coordinates.
    fn incident_done(&self, scored: bool);

    /// Called once after the last incident with the batch totals.
    fn end(&self, scored: usize, skipped: usize);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ScoringProgress for NullProgress {
    fn begin(&self, _incidents: usize) {}
    fn incident_done(&self, _scored: bool) {}
    fn end(&self, _scored: usize, _skipped: usize) {}
}
