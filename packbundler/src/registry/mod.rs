//! Package registry client.
//!
//! The registry is consumed through the [`RegistryClient`] trait so the
//! orchestrator and tests never depend on a transport. Lookups never fail:
//! unknown packages and transport problems both yield empty results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

mod ordering;

#[cfg(feature = "http-registry")]
mod http;

pub use ordering::{build_version_list, resolve_tag, sort_versions};

#[cfg(feature = "http-registry")]
pub use http::HttpRegistryClient;

/// Default public registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// User agent sent with registry requests.
pub const REGISTRY_USER_AGENT: &str = concat!("packbundler/", env!("CARGO_PKG_VERSION"));

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    /// Package name.
    pub name: String,
    /// Latest published version.
    pub version: String,
    /// Short description, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One published version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// The version string.
    pub version: String,
    /// Publish time, when the registry reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Distribution tags currently pointing at this version.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl VersionInfo {
    /// Creates an untagged version with no known publish time.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            created_at: None,
            tags: BTreeSet::new(),
        }
    }

    /// Returns true if `tag` points at this version.
    #[must_use]
    pub fn is_tagged(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Read-only access to a package registry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Searches packages. A blank query returns nothing without a request.
    async fn search(&self, query: &str, limit: usize) -> Vec<PackageSummary>;

    /// Lists every published version, newest first.
    async fn list_versions(&self, package: &str) -> Vec<VersionInfo>;
}

/// Connection settings for [`HttpRegistryClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry.
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// User agent header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    REGISTRY_USER_AGENT.to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl RegistryConfig {
    /// Creates config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PACKBUNDLER_REGISTRY_URL` | Registry base URL |
    /// | `PACKBUNDLER_REGISTRY_TIMEOUT` | Request timeout in seconds |
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("PACKBUNDLER_REGISTRY_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(default_registry_url),
            timeout_secs: std::env::var("PACKBUNDLER_REGISTRY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            user_agent: default_user_agent(),
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}
