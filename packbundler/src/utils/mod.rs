//! Identifier and integrity helpers shared by the registry and orchestrator.

mod ids;
mod integrity;

pub use ids::{generate_artifact_id, generate_retrieval_handle, generate_run_id, HANDLE_PREFIX};
pub use integrity::sri_sha512;
