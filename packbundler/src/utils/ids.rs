//! Identifier generation for runs, artifacts and retrieval handles.

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::core::RetrievalHandle;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Prefix of every retrieval handle token.
pub const HANDLE_PREFIX: &str = "artifact:";

/// Generates a run id (UUID v4).
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Generates an artifact id: `<epoch millis>-<6 random base36 chars>`.
#[must_use]
pub fn generate_artifact_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect();
    format!("{}-{suffix}", now.timestamp_millis())
}

/// Generates an unguessable retrieval handle: `artifact:<32 hex chars>`.
#[must_use]
pub fn generate_retrieval_handle() -> RetrievalHandle {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    RetrievalHandle::new(format!("{HANDLE_PREFIX}{}", hex::encode(bytes)))
}
