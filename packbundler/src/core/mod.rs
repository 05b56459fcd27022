//! Core domain model types for packbundler.
//!
//! This module contains the fundamental types shared by every component:
//! - The package request and its specifier syntax
//! - Stage identifiers, statuses and timeline entries
//! - Command specifications and captured process results
//! - Artifact records and retrieval handles

mod artifact;
mod command;
mod request;
mod stage;

pub use artifact::{ArtifactEntry, ArtifactMeta, ArtifactRecord, RetrievalHandle};
pub use command::{CommandSpec, ProcessResult};
pub use request::PackageRequest;
pub use stage::{Stage, StageId, StageStatus};
