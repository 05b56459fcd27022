//! Where bundle events go.

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, Level};

use super::{BundleEvent, LogLevel};

/// Receives progress events from bundling runs.
///
/// `publish` runs inline on the run's task, so it must return quickly and
/// must not panic. Sinks are handed to the orchestrator explicitly.
pub trait EventSink: Send + Sync {
    /// Accepts one event.
    fn publish(&self, event: &BundleEvent);
}

/// Drops everything. The orchestrator's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn publish(&self, _event: &BundleEvent) {}
}

/// Mirrors events into `tracing` under the `packbundler::events` target.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    verbose: bool,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LoggingEventSink {
    /// Logs at DEBUG when `level` is DEBUG or TRACE, otherwise at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self {
            verbose: level >= Level::DEBUG,
        }
    }

    /// Shorthand for `new(Level::DEBUG)`.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn publish(&self, event: &BundleEvent) {
        let kind = event.event_type();
        if self.verbose {
            debug!(target: "packbundler::events", kind, payload = %event.payload(), "bundle event");
        } else {
            info!(target: "packbundler::events", kind, payload = %event.payload(), "bundle event");
        }
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<BundleEvent>>,
}

impl CollectingEventSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    #[must_use]
    pub fn events(&self) -> Vec<BundleEvent> {
        self.events.lock().clone()
    }

    /// Event type strings, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(BundleEvent::event_type).collect()
    }

    /// JSON payloads of the events whose type starts with `prefix`.
    #[must_use]
    pub fn payloads(&self, prefix: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type().starts_with(prefix))
            .map(BundleEvent::payload)
            .collect()
    }

    /// Progress lines with their severity.
    #[must_use]
    pub fn log_lines(&self) -> Vec<(LogLevel, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BundleEvent::Log { level, line, .. } => Some((*level, line.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True before the first event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forgets everything received.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn publish(&self, event: &BundleEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PackageRequest, StageId};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn log(level: LogLevel, line: &str) -> BundleEvent {
        BundleEvent::Log {
            run: None,
            level,
            line: line.to_string(),
        }
    }

    #[test]
    fn test_noop_and_logging_sinks_accept_events() {
        let sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(NoOpEventSink),
            Arc::new(LoggingEventSink::default()),
            Arc::new(LoggingEventSink::debug()),
        ];
        for sink in sinks {
            sink.publish(&BundleEvent::StageStarted {
                run: None,
                stage: StageId::Boot,
            });
        }
    }

    #[test]
    fn test_collecting_sink_filters_by_prefix() {
        let sink = CollectingEventSink::new();
        sink.publish(&BundleEvent::Started {
            request: PackageRequest::new("left-pad", "1.3.0"),
        });
        sink.publish(&BundleEvent::StageStarted {
            run: None,
            stage: StageId::Boot,
        });
        sink.publish(&BundleEvent::StageCompleted {
            run: None,
            stage: StageId::Boot,
            note: None,
            duration_ms: 1.0,
        });

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.payloads("bundle.stage.").len(), 2);
        assert_eq!(sink.payloads("bundle.stage.started")[0]["stage"], "boot");
        assert_eq!(sink.event_types()[0], "bundle.started");

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_log_lines_keep_level_and_order() {
        let sink = CollectingEventSink::new();
        sink.publish(&log(LogLevel::Info, "Booting workspace runtime..."));
        sink.publish(&BundleEvent::StageStarted {
            run: None,
            stage: StageId::Boot,
        });
        sink.publish(&log(LogLevel::Error, "npm ERR! 404"));

        assert_eq!(
            sink.log_lines(),
            vec![
                (LogLevel::Info, "Booting workspace runtime...".to_string()),
                (LogLevel::Error, "npm ERR! 404".to_string()),
            ]
        );
    }
}
