//! # Packbundler
//!
//! Bundles a registry package together with its fully installed dependency
//! tree into one portable archive.
//!
//! A run installs the requested package inside an isolated workspace
//! runtime, rewrites its manifest so every dependency is bundled and no
//! lifecycle script runs, packs it, and registers the archive under a
//! time-limited retrieval handle. Features:
//!
//! - **Stage timeline**: every run is a `boot → setup → install → patch →
//!   pack → done` state machine observers can subscribe to
//! - **Dedup**: identical requests reuse an unexpired archive
//! - **Retention**: archives expire after a configurable window
//! - **Registry client**: search and version listing with semver ordering
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use packbundler::prelude::*;
//!
//! let runtime = Arc::new(LocalWorkspaceRuntime::new("/tmp/packbundler"));
//! let store = Arc::new(FsArtifactStore::new("/var/lib/packbundler"));
//! let orchestrator = BundleOrchestrator::new(runtime, store, BundlerConfig::from_env());
//! orchestrator.init().await?;
//!
//! let outcome = orchestrator.bundle_specifier("left-pad@1.3.0").await?;
//! if let Some(artifact) = outcome.artifact {
//!     let bytes = orchestrator.artifacts().open(&artifact.retrieval_handle).await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod naming;
pub mod observability;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod runtime;
pub mod testing;
pub mod timeline;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{
        ArtifactRegistry, ArtifactStore, FsArtifactStore, InMemoryArtifactStore, RetentionPolicy,
    };
    pub use crate::config::{BundlerConfig, InstallStrategy};
    pub use crate::core::{
        ArtifactMeta, ArtifactRecord, CommandSpec, PackageRequest, ProcessResult,
        RetrievalHandle, Stage, StageId, StageStatus,
    };
    pub use crate::errors::{ArtifactError, BundleError, RequestError, RuntimeError};
    pub use crate::events::{BundleEvent, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::orchestrator::{BundleOrchestrator, BundleOutcome, BundleStatus};
    #[cfg(feature = "http-registry")]
    pub use crate::registry::HttpRegistryClient;
    pub use crate::registry::{PackageSummary, RegistryClient, RegistryConfig, VersionInfo};
    pub use crate::runtime::{LocalWorkspaceRuntime, WorkspaceRuntime};
    pub use crate::timeline::{TimelineHandle, TimelineSnapshot};
    pub use std::sync::Arc;
}
