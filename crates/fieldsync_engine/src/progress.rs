//! Ordered progress reporting for the presentation layer.

use parking_lot::Mutex;

/// One step in the progress stream of a sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStep {
    /// Short step title, e.g. "Sending events".
    pub title: String,
    /// Longer description of what is happening.
    pub description: String,
    /// Overall cycle progress in `0.0..=1.0`.
    pub fraction: f64,
    /// True for the final step of the cycle.
    pub terminal: bool,
    /// True when the cycle ended in an error.
    pub failed: bool,
}

impl ProgressStep {
    /// Creates an intermediate step.
    pub fn new(title: impl Into<String>, description: impl Into<String>, fraction: f64) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            fraction: fraction.clamp(0.0, 1.0),
            terminal: false,
            failed: false,
        }
    }

    /// Creates the terminal success step.
    pub fn finished(description: impl Into<String>) -> Self {
        Self {
            title: "Synchronization finished".into(),
            description: description.into(),
            fraction: 1.0,
            terminal: true,
            failed: false,
        }
    }

    /// Creates a terminal failure step.
    pub fn failed(description: impl Into<String>, fraction: f64) -> Self {
        Self {
            title: "Synchronization failed".into(),
            description: description.into(),
            fraction: fraction.clamp(0.0, 1.0),
            terminal: true,
            failed: true,
        }
    }
}

/// Consumes the ordered progress stream of a cycle.
pub trait ProgressSink: Send + Sync {
    /// Receives the next step. Steps arrive in order; exactly one terminal
    /// step ends every cycle.
    fn report(&self, step: ProgressStep);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _step: ProgressStep) {}
}

/// Collects every step, useful for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingSink {
    steps: Mutex<Vec<ProgressStep>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the collected steps.
    pub fn steps(&self) -> Vec<ProgressStep> {
        self.steps.lock().clone()
    }
}

impl ProgressSink for CollectingSink {
    fn report(&self, step: ProgressStep) {
        self.steps.lock().push(step);
    }
}
