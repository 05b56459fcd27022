//! Test assertions for stage timelines.

use crate::core::{StageId, StageStatus};
use crate::timeline::TimelineSnapshot;

/// Asserts that the run visited exactly the canonical stages, all `done`.
pub fn assert_completed(snapshot: &TimelineSnapshot) {
    assert!(
        snapshot.is_complete(),
        "Expected a completed run, got: {:?}",
        snapshot.stages
    );
    assert!(
        !snapshot.is_failed(),
        "Completed run has an error entry: {:?}",
        snapshot.terminal_error()
    );
    for id in StageId::ORDER {
        assert_stage_status(snapshot, id, StageStatus::Done);
    }
}

/// Asserts that the run failed at `stage` with exactly one error entry.
pub fn assert_failed_at(snapshot: &TimelineSnapshot, stage: StageId) {
    assert_stage_status(snapshot, stage, StageStatus::Error);

    let errors: Vec<_> = snapshot
        .stages
        .iter()
        .filter(|s| s.id == StageId::Error)
        .collect();
    assert_eq!(errors.len(), 1, "Expected one error entry, got {errors:?}");
    assert!(
        errors[0].note.as_deref().is_some_and(|n| !n.is_empty()),
        "Error entry has no note"
    );
    assert!(
        snapshot.active().is_none(),
        "Failed run still has an active stage: {:?}",
        snapshot.active()
    );
}

/// Asserts the status of one stage.
pub fn assert_stage_status(snapshot: &TimelineSnapshot, stage: StageId, expected: StageStatus) {
    let actual = snapshot.stage(stage).map(|s| s.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage {stage} to be {expected}, got {actual:?}"
    );
}

/// Asserts that start times of visited stages never go backwards.
pub fn assert_monotonic(snapshot: &TimelineSnapshot) {
    let mut last = None;
    for stage in snapshot.visited() {
        let Some(started) = stage.started_at else {
            continue;
        };
        if let Some(prev) = last {
            assert!(started >= prev, "Stage {} started before its predecessor", stage.id);
        }
        if let Some(finished) = stage.finished_at {
            assert!(finished >= started, "Stage {} finished before it started", stage.id);
        }
        last = Some(started);
    }
}
