//! Testing utilities for bundling runs.
//!
//! This module provides:
//! - A scripted in-memory workspace runtime
//! - npm fixtures for a full successful run
//! - Timeline assertions

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_completed, assert_failed_at, assert_monotonic, assert_stage_status};
pub use fixtures::{sample_lockfile, sample_manifest, script_npm_success, tarball_name};
pub use mocks::{RuntimeCall, ScriptedResponse, ScriptedRuntime, EXIT_NOT_SCRIPTED};
