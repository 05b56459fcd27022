//! Span and timing helpers for bundling runs.

use std::time::Instant;
use tracing::Span;

use crate::core::{PackageRequest, StageId};

/// Creates the span every log line of one run is recorded under.
///
/// `run_id` starts empty and is recorded once setup allocates it.
#[must_use]
pub fn bundle_span(request: &PackageRequest) -> Span {
    tracing::info_span!(
        "bundle",
        package = %request.name,
        version = %request.version,
        run_id = tracing::field::Empty,
    )
}

/// Measures how long a stage ran.
#[derive(Debug)]
pub struct StageTimer {
    stage: StageId,
    start: Instant,
}

impl StageTimer {
    /// Starts timing `stage`.
    #[must_use]
    pub fn start(stage: StageId) -> Self {
        Self {
            stage,
            start: Instant::now(),
        }
    }

    /// The stage being timed.
    #[must_use]
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stops the timer and returns the elapsed milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_timer() {
        let timer = StageTimer::start(StageId::Install);
        assert_eq!(timer.stage(), StageId::Install);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.finish() >= 1.0);
    }

    #[test]
    fn test_bundle_span_without_subscriber() {
        let span = bundle_span(&PackageRequest::new("left-pad", "1.3.0"));
        span.record("run_id", "abc");
        let _entered = span.enter();
    }
}
