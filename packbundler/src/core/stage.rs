//! Stage identifiers, statuses and timeline entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one step of the bundling pipeline.
///
/// `Error` is not part of [`StageId::ORDER`]; it only appears as the synthetic
/// terminal entry a failed run appends to its timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Mount the workspace runtime.
    Boot,
    /// Allocate the run workspace and initialize it.
    Setup,
    /// Install the package and its dependency tree.
    Install,
    /// Rewrite the installed manifest for bundling.
    Patch,
    /// Produce the archive.
    Pack,
    /// The run finished successfully.
    Done,
    /// Out-of-band terminal error marker.
    Error,
}

impl StageId {
    /// The canonical stage order of a successful run.
    pub const ORDER: [Self; 6] = [
        Self::Boot,
        Self::Setup,
        Self::Install,
        Self::Patch,
        Self::Pack,
        Self::Done,
    ];

    /// Returns the wire name of the stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Setup => "setup",
            Self::Install => "install",
            Self::Patch => "patch",
            Self::Pack => "pack",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Returns the human-readable label shown to observers.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Boot => "Booting up",
            Self::Setup => "Setting up environment",
            Self::Install => "Installing package",
            Self::Patch => "Patching package.json",
            Self::Pack => "Creating tarball",
            Self::Done => "Done",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Currently running.
    Active,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Error,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl StageStatus {
    /// Returns true if the stage can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// One entry of a stage timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Which stage this is.
    pub id: StageId,
    /// Display label.
    pub label: String,
    /// Current status.
    pub status: StageStatus,
    /// When the stage became active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage reached `done` or `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Free-form note (artifact name, error description).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Stage {
    /// Creates a pending stage with its canonical label.
    #[must_use]
    pub fn pending(id: StageId) -> Self {
        Self {
            id,
            label: id.label().to_string(),
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            note: None,
        }
    }

    /// Time between start and finish, if both are known.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_display() {
        assert_eq!(StageId::Boot.to_string(), "boot");
        assert_eq!(StageId::Pack.to_string(), "pack");
        assert_eq!(StageId::Error.to_string(), "error");
    }

    #[test]
    fn test_order_excludes_error() {
        assert_eq!(StageId::ORDER.len(), 6);
        assert!(!StageId::ORDER.contains(&StageId::Error));
        assert_eq!(StageId::ORDER.last(), Some(&StageId::Done));
    }

    #[test]
    fn test_stage_status_is_terminal() {
        assert!(StageStatus::Done.is_terminal());
        assert!(StageStatus::Error.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Active.is_terminal());
    }

    #[test]
    fn test_stage_serialize() {
        let stage = Stage::pending(StageId::Install);
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "install",
                "label": "Installing package",
                "status": "pending",
            })
        );
    }

    #[test]
    fn test_stage_duration() {
        let mut stage = Stage::pending(StageId::Pack);
        assert!(stage.duration().is_none());

        let start = Utc::now();
        stage.started_at = Some(start);
        stage.finished_at = Some(start + chrono::Duration::milliseconds(250));
        assert_eq!(stage.duration(), Some(chrono::Duration::milliseconds(250)));
    }
}
