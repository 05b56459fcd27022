//! The bundling orchestrator.
//!
//! [`BundleOrchestrator`] drives one request through
//! `boot → setup → install → patch → pack → done`, recording every
//! transition on a [`TimelineHandle`] and registering the produced archive.
//! Failures never escape as `Err`: they become the outcome's
//! [`BundleStatus::Failed`] and the timeline's terminal `error` entry.

mod introspect;
mod patch;
mod pipeline;


pub use introspect::{
    dependency_stats, probe_tool_versions, read_dependency_stats, DependencyStats, ToolVersions,
};
pub use patch::{patch_manifest, render_manifest, LIFECYCLE_HOOKS};

use std::sync::Arc;
use uuid::Uuid;

use crate::artifacts::{ArtifactRegistry, ArtifactStore};
use crate::config::BundlerConfig;
use crate::core::{ArtifactRecord, PackageRequest, StageId};
use crate::errors::{ArtifactError, BundleError, RequestError};
use crate::events::{EventSink, NoOpEventSink};
use crate::process::ProcessRunner;
use crate::registry::RegistryClient;
use crate::runtime::WorkspaceRuntime;
use crate::timeline::{TimelineHandle, TimelineSnapshot};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStatus {
    /// A new archive was produced and registered.
    Bundled,
    /// An existing archive for the same name and version was reused.
    Deduplicated,
    /// The run stopped at `stage`.
    Failed {
        /// The stage the failure was attributed to.
        stage: StageId,
        /// What went wrong.
        error: BundleError,
    },
}

impl BundleStatus {
    /// Returns true for `Bundled` and `Deduplicated`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Wire name used in emitted events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bundled => "bundled",
            Self::Deduplicated => "deduplicated",
            Self::Failed { .. } => "failed",
        }
    }

    /// The error of a failed run.
    #[must_use]
    pub fn error(&self) -> Option<&BundleError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Result of one [`BundleOrchestrator::bundle`] call.
#[derive(Debug, Clone)]
pub struct BundleOutcome {
    /// Workspace run id; `None` if the run ended before setup allocated one.
    pub run_id: Option<Uuid>,
    /// The request as executed, with `latest` resolved where possible.
    pub request: PackageRequest,
    /// How the run ended.
    pub status: BundleStatus,
    /// Final state of the stage timeline.
    pub timeline: TimelineSnapshot,
    /// The produced or reused artifact.
    pub artifact: Option<ArtifactRecord>,
}

impl BundleOutcome {
    /// Returns true if the run produced or reused an archive.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Drives bundling runs against a workspace runtime.
///
/// Cheap to share behind an `Arc`; independent runs may execute
/// concurrently, each in its own workspace with its own timeline.
pub struct BundleOrchestrator {
    runtime: Arc<dyn WorkspaceRuntime>,
    runner: ProcessRunner,
    artifacts: ArtifactRegistry,
    registry: Option<Arc<dyn RegistryClient>>,
    events: Arc<dyn EventSink>,
    config: BundlerConfig,
}

impl std::fmt::Debug for BundleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleOrchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

impl BundleOrchestrator {
    /// Creates an orchestrator with no registry client and a no-op event sink.
    ///
    /// Artifacts are kept in `store` for `config.retention`.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn WorkspaceRuntime>,
        store: Arc<dyn ArtifactStore>,
        config: BundlerConfig,
    ) -> Self {
        Self {
            runner: ProcessRunner::new(runtime.clone()),
            runtime,
            artifacts: ArtifactRegistry::from_config(store, &config),
            registry: None,
            events: Arc::new(NoOpEventSink),
            config,
        }
    }

    /// Attaches a registry client, used to resolve `latest`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the event sink progress is published to.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    /// The artifact registry runs register into.
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactRegistry {
        &self.artifacts
    }

    /// Loads persisted artifacts and starts the periodic expiry sweep.
    ///
    /// Returns the number of artifacts restored.
    pub async fn init(&self) -> Result<usize, ArtifactError> {
        let restored = self.artifacts.hydrate().await?;
        self.artifacts.spawn_sweeper(self.config.sweep_interval());
        Ok(restored)
    }

    /// Stops expiry timers and the sweeper.
    pub fn shutdown(&self) {
        self.artifacts.teardown();
    }

    /// Runs `request` on a fresh timeline.
    pub async fn bundle(&self, request: &PackageRequest) -> BundleOutcome {
        let timeline = TimelineHandle::new();
        self.bundle_observed(request, &timeline).await
    }

    /// Runs `request`, recording progress on `timeline`.
    ///
    /// The timeline is reset first, so a handle can be reused across runs
    /// while observers stay subscribed.
    pub async fn bundle_observed(
        &self,
        request: &PackageRequest,
        timeline: &TimelineHandle,
    ) -> BundleOutcome {
        pipeline::Run::new(self, request.clone(), timeline).execute().await
    }

    /// Parses a deep-link specifier (`name`, `name@version`, `@scope/name@version`)
    /// and runs it.
    pub async fn bundle_specifier(&self, specifier: &str) -> Result<BundleOutcome, RequestError> {
        let request = PackageRequest::parse_specifier(specifier)?;
        Ok(self.bundle(&request).await)
    }
}
