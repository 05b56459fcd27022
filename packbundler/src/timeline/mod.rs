//! Stage timeline: the finite-state record of a run's progress.
//!
//! [`StageTimeline`] holds the pure state transitions. [`TimelineHandle`] wraps
//! one timeline per run so the orchestrator can mutate it while observers
//! subscribe to snapshots.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::core::{Stage, StageId, StageStatus};

/// Read-only view of a timeline at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    /// Stages in canonical order, followed by the synthetic `error` entry if any.
    pub stages: Vec<Stage>,
    /// When the last transition was applied.
    pub last_transition_at: DateTime<Utc>,
}

impl TimelineSnapshot {
    /// Returns the entry for `id`.
    #[must_use]
    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Returns the active stage, if any.
    #[must_use]
    pub fn active(&self) -> Option<&Stage> {
        self.stages.iter().find(|s| s.status == StageStatus::Active)
    }

    /// Returns the synthetic terminal `error` entry, if any.
    #[must_use]
    pub fn terminal_error(&self) -> Option<&Stage> {
        self.stage(StageId::Error)
    }

    /// Returns true if the run failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.terminal_error().is_some()
    }

    /// Returns true if the `done` stage finished successfully.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage(StageId::Done)
            .is_some_and(|s| s.status == StageStatus::Done)
    }

    /// Stages that have left `pending`, in order.
    pub fn visited(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|s| s.status != StageStatus::Pending)
    }
}

/// Pure stage state machine.
///
/// Invariants kept by every transition:
/// - at most one stage is `active`
/// - `done` and `error` are final for a stage
/// - at most one synthetic `error` entry exists, always last
/// - timestamps never decrease
#[derive(Debug, Clone)]
pub struct StageTimeline {
    stages: Vec<Stage>,
    last_transition_at: DateTime<Utc>,
}

impl Default for StageTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTimeline {
    /// Creates a timeline with every canonical stage pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: StageId::ORDER.iter().copied().map(Stage::pending).collect(),
            last_transition_at: Utc::now(),
        }
    }

    /// Returns every stage to `pending` and drops the synthetic error entry.
    pub fn reset(&mut self) {
        self.stages = StageId::ORDER.iter().copied().map(Stage::pending).collect();
        self.last_transition_at = self.now();
    }

    /// Marks a pending stage active.
    ///
    /// Returns false for unknown ids, stages that already left `pending`,
    /// or while another stage is active.
    pub fn start(&mut self, id: StageId) -> bool {
        if self.stages.iter().any(|s| s.status == StageStatus::Active) {
            return false;
        }

        let now = self.now();
        let Some(stage) = self.entry_mut(id) else {
            return false;
        };
        if stage.status != StageStatus::Pending {
            return false;
        }

        stage.status = StageStatus::Active;
        stage.started_at = Some(now);
        self.last_transition_at = now;
        true
    }

    /// Marks a pending or active stage `done`.
    ///
    /// Keeps the prior note when `note` is `None`.
    pub fn succeed(&mut self, id: StageId, note: Option<&str>) -> bool {
        self.finish(id, StageStatus::Done, note)
    }

    /// Marks a pending or active stage `error` and appends the synthetic
    /// terminal `error` entry if none exists yet.
    ///
    /// Returns true if anything changed.
    pub fn fail(&mut self, id: StageId, note: Option<&str>) -> bool {
        let marked = id != StageId::Error && self.finish(id, StageStatus::Error, note);

        if self.stages.iter().any(|s| s.id == StageId::Error) {
            return marked;
        }

        let now = self.now();
        let mut entry = Stage::pending(StageId::Error);
        entry.status = StageStatus::Error;
        entry.started_at = Some(now);
        entry.finished_at = Some(now);
        entry.note = note.map(str::to_string);
        self.stages.push(entry);
        self.last_transition_at = now;
        true
    }

    /// Returns the active stage id, if any.
    #[must_use]
    pub fn active(&self) -> Option<StageId> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::Active)
            .map(|s| s.id)
    }

    /// Returns the most recently started canonical stage.
    #[must_use]
    pub fn last_started(&self) -> Option<StageId> {
        self.stages
            .iter()
            .filter(|s| s.id != StageId::Error && s.started_at.is_some())
            .max_by_key(|s| s.started_at)
            .map(|s| s.id)
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            stages: self.stages.clone(),
            last_transition_at: self.last_transition_at,
        }
    }

    fn finish(&mut self, id: StageId, status: StageStatus, note: Option<&str>) -> bool {
        let now = self.now();
        let Some(stage) = self.entry_mut(id) else {
            return false;
        };
        if stage.status.is_terminal() {
            return false;
        }

        stage.status = status;
        stage.finished_at = Some(now);
        if let Some(note) = note {
            stage.note = Some(note.to_string());
        }
        self.last_transition_at = now;
        true
    }

    fn entry_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == id)
    }

    // Wall clocks can step backwards.
    fn now(&self) -> DateTime<Utc> {
        Utc::now().max(self.last_transition_at)
    }
}

/// Shared, observable timeline for one run.
///
/// Cloning the handle shares the same timeline. Every applied transition
/// is published to subscribers.
#[derive(Debug, Clone)]
pub struct TimelineHandle {
    inner: Arc<Mutex<StageTimeline>>,
    tx: Arc<watch::Sender<TimelineSnapshot>>,
}

impl Default for TimelineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineHandle {
    /// Creates a fresh timeline.
    #[must_use]
    pub fn new() -> Self {
        let timeline = StageTimeline::new();
        let (tx, _rx) = watch::channel(timeline.snapshot());
        Self {
            inner: Arc::new(Mutex::new(timeline)),
            tx: Arc::new(tx),
        }
    }

    /// Subscribes to snapshots. The receiver starts at the current state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TimelineSnapshot> {
        self.tx.subscribe()
    }

    /// Returns the current state.
    #[must_use]
    pub fn snapshot(&self) -> TimelineSnapshot {
        self.inner.lock().snapshot()
    }

    /// See [`StageTimeline::reset`].
    pub fn reset(&self) {
        self.apply(|t| {
            t.reset();
            true
        });
    }

    /// See [`StageTimeline::start`].
    pub fn start(&self, id: StageId) -> bool {
        self.apply(|t| t.start(id))
    }

    /// See [`StageTimeline::succeed`].
    pub fn succeed(&self, id: StageId, note: Option<&str>) -> bool {
        self.apply(|t| t.succeed(id, note))
    }

    /// See [`StageTimeline::fail`].
    pub fn fail(&self, id: StageId, note: Option<&str>) -> bool {
        self.apply(|t| t.fail(id, note))
    }

    /// Returns the active stage id, if any.
    #[must_use]
    pub fn active(&self) -> Option<StageId> {
        self.inner.lock().active()
    }

    /// Returns the most recently started canonical stage.
    #[must_use]
    pub fn last_started(&self) -> Option<StageId> {
        self.inner.lock().last_started()
    }

    /// Returns true if a stage is active and nothing changed for `threshold`.
    #[must_use]
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let snapshot = self.snapshot();
        if snapshot.active().is_none() {
            return false;
        }
        let Ok(threshold) = chrono::Duration::from_std(threshold) else {
            return false;
        };
        Utc::now() - snapshot.last_transition_at >= threshold
    }

    fn apply(&self, f: impl FnOnce(&mut StageTimeline) -> bool) -> bool {
        let mut timeline = self.inner.lock();
        let applied = f(&mut timeline);
        if applied {
            self.tx.send_replace(timeline.snapshot());
        }
        applied
    }
}
