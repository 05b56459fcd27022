//! Artifact records and retrieval handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Descriptive metadata attached to a produced archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// The bundled package name.
    pub package: String,
    /// The bundled version.
    pub version: String,
    /// Any additional descriptive fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ArtifactMeta {
    /// Creates metadata for a package version.
    #[must_use]
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Adds an extra field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Returns true if this describes exactly `package@version`.
    #[must_use]
    pub fn describes(&self, package: &str, version: &str) -> bool {
        self.package == package && self.version == version
    }
}

/// The persisted part of an artifact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Unique artifact id.
    pub id: String,
    /// Archive filename, e.g. `express-5.1.0.tgz`.
    pub name: String,
    /// Size of the archive in bytes.
    pub size_bytes: u64,
    /// Subresource-integrity string (`sha512-…`), if computed.
    #[serde(default)]
    pub integrity: Option<String>,
    /// When the artifact was registered.
    pub created_at: DateTime<Utc>,
    /// Descriptive metadata.
    pub meta: ArtifactMeta,
}

/// Opaque token through which an artifact's bytes can be retrieved.
///
/// Valid exactly as long as its record is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrievalHandle(String);

impl RetrievalHandle {
    /// Wraps a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RetrievalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered artifact together with its live retrieval handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Persisted fields.
    #[serde(flatten)]
    pub entry: ArtifactEntry,
    /// Handle issued for this process lifetime.
    pub retrieval_handle: RetrievalHandle,
}

impl ArtifactRecord {
    /// Artifact id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    /// Archive filename.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Registration time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.entry.created_at
    }

    /// Descriptive metadata.
    #[must_use]
    pub fn meta(&self) -> &ArtifactMeta {
        &self.entry.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_flattens_extra_fields() {
        let meta = ArtifactMeta::new("express", "5.1.0")
            .with_extra("run_id", serde_json::json!("abc"));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"package": "express", "version": "5.1.0", "run_id": "abc"})
        );

        let back: ArtifactMeta = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_meta_describes() {
        let meta = ArtifactMeta::new("left-pad", "1.3.0");
        assert!(meta.describes("left-pad", "1.3.0"));
        assert!(!meta.describes("left-pad", "1.2.0"));
        assert!(!meta.describes("right-pad", "1.3.0"));
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = ArtifactRecord {
            entry: ArtifactEntry {
                id: "1700000000000-abc123".to_string(),
                name: "left-pad-1.3.0.tgz".to_string(),
                size_bytes: 2048,
                integrity: None,
                created_at: Utc::now(),
                meta: ArtifactMeta::new("left-pad", "1.3.0"),
            },
            retrieval_handle: RetrievalHandle::new("artifact:00ff"),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "1700000000000-abc123");
        assert_eq!(json["retrieval_handle"], "artifact:00ff");
        assert_eq!(json["meta"]["package"], "left-pad");
        assert_eq!(record.name(), "left-pad-1.3.0.tgz");
    }
}
