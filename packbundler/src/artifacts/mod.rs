//! Produced artifacts: storage backends, retention and the registry.

mod fs_store;
mod registry;
mod retention;
mod store;

pub use fs_store::FsArtifactStore;
pub use registry::ArtifactRegistry;
pub use retention::{RetentionPolicy, DEFAULT_RETENTION};
pub use store::{ArtifactStore, InMemoryArtifactStore};
