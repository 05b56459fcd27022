//! HTTP registry client for npm-compatible registries.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{build_version_list, PackageSummary, RegistryClient, RegistryConfig, VersionInfo};
use crate::errors::RegistryError;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    objects: Vec<SearchObject>,
}

#[derive(Debug, Deserialize)]
struct SearchObject {
    package: PackageSummary,
}

#[derive(Debug, Deserialize)]
struct PackageDocument {
    #[serde(default)]
    versions: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    time: BTreeMap<String, String>,
    #[serde(default, rename = "dist-tags")]
    dist_tags: BTreeMap<String, String>,
}

/// Registry client speaking the public npm registry API.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRegistryClient {
    /// Creates a client from config.
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut default_headers = HeaderMap::new();
        let user_agent =
            HeaderValue::from_str(&config.user_agent).map_err(|e| RegistryError::Network {
                message: format!("invalid user agent: {e}"),
            })?;
        default_headers.insert(USER_AGENT, user_agent);
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| RegistryError::Network {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let base_url =
            Url::parse(config.url.trim_end_matches('/')).map_err(|e| RegistryError::Network {
                message: format!("invalid registry url '{}': {e}", config.url),
            })?;

        Ok(Self { client, base_url })
    }

    /// Creates a client from `PACKBUNDLER_REGISTRY_*` variables.
    pub fn from_env() -> Result<Self, RegistryError> {
        Self::new(&RegistryConfig::from_env())
    }

    /// Searches, surfacing transport errors.
    pub async fn try_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PackageSummary>, RegistryError> {
        let mut url = self.endpoint(&["-", "v1", "search"]);
        url.query_pairs_mut()
            .append_pair("text", query)
            .append_pair("size", &limit.to_string());

        let response: SearchResponse = self.get_json(url).await?;
        Ok(response.objects.into_iter().map(|o| o.package).collect())
    }

    /// Lists versions, surfacing transport errors.
    pub async fn try_list_versions(&self, package: &str) -> Result<Vec<VersionInfo>, RegistryError> {
        let url = self.endpoint(&[package]);
        let doc: PackageDocument = self.get_json(url).await?;

        Ok(build_version_list(
            doc.versions.into_keys(),
            &doc.time,
            &doc.dist_tags,
        ))
    }

    // Segments are percent-encoded individually, so `@scope/pkg` stays one
    // segment (`@scope%2Fpkg`).
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, RegistryError> {
        debug!(url = %url, "registry request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RegistryError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn search(&self, query: &str, limit: usize) -> Vec<PackageSummary> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        match self.try_search(query, limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!(query = %query, error = %e, "registry search failed");
                Vec::new()
            }
        }
    }

    async fn list_versions(&self, package: &str) -> Vec<VersionInfo> {
        match self.try_list_versions(package).await {
            Ok(versions) => versions,
            Err(e) => {
                warn!(package = %package, error = %e, "version listing failed");
                Vec::new()
            }
        }
    }
}
