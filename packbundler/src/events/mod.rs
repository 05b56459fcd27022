//! Progress events for observers of bundling runs.
//!
//! The stage timeline is the source of truth for what happened; events are
//! the push-style mirror of it plus the human-readable progress lines a
//! terminal view would show.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::Serialize;
use uuid::Uuid;

use crate::core::{PackageRequest, StageId};

/// Severity of a progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Normal progress.
    Info,
    /// Something went wrong.
    Error,
}

/// A typed event emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BundleEvent {
    /// A request was accepted.
    Started {
        /// The request, with `latest` already resolved where possible.
        request: PackageRequest,
    },
    /// An existing artifact satisfied the request.
    Deduplicated {
        /// The request.
        request: PackageRequest,
        /// Id of the reused artifact.
        artifact_id: String,
        /// Archive filename of the reused artifact.
        name: String,
    },
    /// A stage became active.
    StageStarted {
        /// Run id, once allocated.
        run: Option<Uuid>,
        /// The stage.
        stage: StageId,
    },
    /// A stage finished successfully.
    StageCompleted {
        /// Run id, once allocated.
        run: Option<Uuid>,
        /// The stage.
        stage: StageId,
        /// Note recorded on the stage.
        note: Option<String>,
        /// Time spent in the stage.
        duration_ms: f64,
    },
    /// A stage failed; the run is over.
    StageFailed {
        /// Run id, once allocated.
        run: Option<Uuid>,
        /// The stage.
        stage: StageId,
        /// Machine-readable error kind.
        kind: String,
        /// The terminal error note.
        note: String,
    },
    /// A human-readable progress line.
    Log {
        /// Run id, once allocated.
        run: Option<Uuid>,
        /// Severity.
        level: LogLevel,
        /// The line.
        line: String,
    },
    /// The run finished, successfully or not.
    Completed {
        /// Run id, if a workspace was allocated.
        run: Option<Uuid>,
        /// The request.
        request: PackageRequest,
        /// `bundled`, `deduplicated` or `failed`.
        status: String,
        /// Produced or reused artifact id.
        artifact_id: Option<String>,
    },
}

impl BundleEvent {
    /// The event type string.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "bundle.started",
            Self::Deduplicated { .. } => "bundle.deduplicated",
            Self::StageStarted { .. } => "bundle.stage.started",
            Self::StageCompleted { .. } => "bundle.stage.completed",
            Self::StageFailed { .. } => "bundle.stage.failed",
            Self::Log { .. } => "bundle.log",
            Self::Completed { .. } => "bundle.completed",
        }
    }

    /// The event payload as JSON.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_payload_shape() {
        let event = BundleEvent::StageFailed {
            run: None,
            stage: StageId::Install,
            kind: "command_failed".to_string(),
            note: "npm install failed (exit code 1)".to_string(),
        };
        assert_eq!(event.event_type(), "bundle.stage.failed");
        assert_eq!(
            event.payload(),
            serde_json::json!({
                "run": null,
                "stage": "install",
                "kind": "command_failed",
                "note": "npm install failed (exit code 1)",
            })
        );
    }

    #[test]
    fn test_log_payload() {
        let event = BundleEvent::Log {
            run: Some(Uuid::nil()),
            level: LogLevel::Error,
            line: "boom".to_string(),
        };
        assert_eq!(event.payload()["level"], "error");
        assert_eq!(event.payload()["run"], "00000000-0000-0000-0000-000000000000");
    }
}
