//! Error types for the bundling engine.
//!
//! Every collaborator seam (workspace runtime, registry, artifact store) has
//! its own error enum. The orchestrator folds all of them into
//! [`BundleError`], which is what a failed run reports on its stage timeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::StageId;

/// The error taxonomy of a bundling run.
///
/// None of these escape [`crate::orchestrator::BundleOrchestrator::bundle`];
/// they are converted into a terminal `error` timeline entry and carried on
/// the outcome for callers that want the structured form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    /// The workspace runtime is not ready or cannot be reached.
    #[error("Workspace runtime unavailable: {reason}")]
    RuntimeUnavailable {
        /// Why the runtime could not be used.
        reason: String,
    },

    /// A spawned command exited with a non-zero code.
    #[error("`{command}` failed with exit code {exit_code} during {stage}")]
    CommandFailed {
        /// Stage that spawned the command.
        stage: StageId,
        /// The command line that was run.
        command: String,
        /// Exit code reported by the runtime.
        exit_code: i32,
        /// Captured diagnostic output.
        stderr: String,
    },

    /// The package manifest could not be read, parsed or written.
    #[error("Manifest error at {}: {reason}", path.display())]
    ManifestError {
        /// Manifest path inside the workspace.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Pack succeeded but its output did not name the produced archive.
    #[error("Could not determine the archive filename from pack output")]
    ArtifactNameUnresolved {
        /// The captured pack stdout.
        stdout: String,
    },

    /// Anything else, including panics inside a pipeline step.
    #[error("Unexpected error: {message}")]
    UnexpectedFailure {
        /// Human-readable description.
        message: String,
    },
}

impl BundleError {
    /// Creates an unexpected failure from any displayable error.
    #[must_use]
    pub fn unexpected(error: impl std::fmt::Display) -> Self {
        Self::UnexpectedFailure {
            message: error.to_string(),
        }
    }

    /// Short machine-readable kind, used in emitted events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RuntimeUnavailable { .. } => "runtime_unavailable",
            Self::CommandFailed { .. } => "command_failed",
            Self::ManifestError { .. } => "manifest_error",
            Self::ArtifactNameUnresolved { .. } => "artifact_name_unresolved",
            Self::UnexpectedFailure { .. } => "unexpected_failure",
        }
    }

    /// The stage this error belongs to, when the error itself knows it.
    ///
    /// `UnexpectedFailure` returns `None` and is attributed to whichever
    /// stage was active when it happened.
    #[must_use]
    pub fn stage_hint(&self) -> Option<StageId> {
        match self {
            Self::RuntimeUnavailable { .. } => Some(StageId::Boot),
            Self::CommandFailed { stage, .. } => Some(*stage),
            Self::ManifestError { .. } => Some(StageId::Patch),
            Self::ArtifactNameUnresolved { .. } => Some(StageId::Pack),
            Self::UnexpectedFailure { .. } => None,
        }
    }

    /// A remediation hint for the user, where one is known.
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeUnavailable { .. } => {
                Some("The workspace runtime is not ready yet. Wait a moment and try again.")
            }
            Self::CommandFailed { stage, .. } => match stage {
                StageId::Setup => {
                    Some("Re-run the bundle or pick a different package/version.")
                }
                StageId::Install => Some(
                    "Lifecycle scripts are disabled in this sandbox. If the package requires \
                     native build tooling or git, try another version or package.",
                ),
                StageId::Pack => Some(
                    "Try a different version. Some packages expect git or native tooling \
                     when packing.",
                ),
                _ => None,
            },
            Self::ManifestError { .. } => {
                Some("Some packages have unusual layouts that prevent packing in a sandbox.")
            }
            Self::ArtifactNameUnresolved { .. } => {
                Some("Inspect the pack output; the archive may have been written under an unexpected name.")
            }
            Self::UnexpectedFailure { .. } => {
                Some("If this keeps happening, report the error details.")
            }
        }
    }

    /// The note written on the terminal `error` timeline entry.
    ///
    /// Always non-empty; includes the remediation hint when there is one.
    #[must_use]
    pub fn timeline_note(&self) -> String {
        let summary = match self {
            Self::RuntimeUnavailable { .. } => "Workspace runtime not ready".to_string(),
            Self::CommandFailed {
                command, exit_code, ..
            } => {
                let head = command.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
                format!("{head} failed (exit code {exit_code})")
            }
            Self::ManifestError { .. } => "Failed to patch package.json".to_string(),
            Self::ArtifactNameUnresolved { .. } => "Could not parse tarball name".to_string(),
            Self::UnexpectedFailure { message } => message.clone(),
        };

        match self.remediation() {
            Some(hint) => format!("{summary}. {hint}"),
            None => summary,
        }
    }
}

impl From<RuntimeError> for BundleError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::Unavailable { reason } => Self::RuntimeUnavailable { reason },
            other => Self::unexpected(other),
        }
    }
}

impl From<ArtifactError> for BundleError {
    fn from(error: ArtifactError) -> Self {
        Self::unexpected(error)
    }
}

/// Error raised when a package specifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid package specifier '{input}': {reason}")]
pub struct RequestError {
    /// The specifier as given.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl RequestError {
    /// Creates a new request error.
    #[must_use]
    pub fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by a [`crate::runtime::WorkspaceRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime itself cannot be reached or was never mounted.
    #[error("Workspace runtime unavailable: {reason}")]
    Unavailable {
        /// Why the runtime is unavailable.
        reason: String,
    },

    /// A path does not exist inside the workspace.
    #[error("Path not found in workspace: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A path tried to leave the workspace root.
    #[error("Path escapes the workspace root: {}", path.display())]
    InvalidPath {
        /// The rejected path.
        path: PathBuf,
    },

    /// Any other filesystem or process I/O failure.
    #[error("Workspace I/O error at {}: {source}", path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Maps an I/O error at `path`, turning `NotFound` into [`RuntimeError::NotFound`].
    #[must_use]
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Returns true if the runtime itself is unreachable.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Errors from the package registry transport.
///
/// Only seen inside the HTTP client; the public registry operations degrade
/// to empty results.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The request could not be sent or the body not read.
    #[error("network error: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// The registry answered with a non-success status.
    #[error("registry returned {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The body was not the expected JSON shape.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Parse failure description.
        message: String,
    },
}

/// Errors from an [`crate::artifacts::ArtifactStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("artifact store I/O error at {}: {source}", path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Metadata could not be encoded or decoded.
    #[error("artifact metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored entry is inconsistent.
    #[error("artifact '{id}' is corrupt: {reason}")]
    Corrupt {
        /// Artifact id.
        id: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors from the [`crate::artifacts::ArtifactRegistry`].
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// No live artifact for the given id or handle.
    #[error("artifact not found: {key}")]
    NotFound {
        /// The id or handle that was looked up.
        key: String,
    },

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from best-effort dependency introspection.
#[derive(Debug, Error)]
pub enum IntrospectionError {
    /// The lockfile could not be read.
    #[error("lockfile unavailable: {0}")]
    Unreadable(#[from] RuntimeError),

    /// The lockfile was not valid JSON or had an unexpected shape.
    #[error("lockfile malformed: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },
}
