//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::artifacts::RetentionPolicy;
use crate::registry::RegistryConfig;

/// Layout of the installed dependency tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStrategy {
    /// Every package gets its own `node_modules` (no hoisting).
    #[default]
    Nested,
    /// Dependencies hoisted to the workspace's top-level `node_modules`.
    ///
    /// They then sit outside the package directory, so the packed archive
    /// does not contain them. Only `Nested` yields a self-contained bundle.
    #[serde(alias = "flat")]
    Hoisted,
}

impl InstallStrategy {
    /// Value for npm's `--install-strategy` flag.
    #[must_use]
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Nested => "nested",
            Self::Hoisted => "hoisted",
        }
    }
}

impl fmt::Display for InstallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

impl FromStr for InstallStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nested" => Ok(Self::Nested),
            "hoisted" | "flat" => Ok(Self::Hoisted),
            other => Err(format!("unknown install strategy '{other}'")),
        }
    }
}

/// Configuration for a [`crate::orchestrator::BundleOrchestrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// Registry connection settings.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Dependency tree layout.
    #[serde(default)]
    pub install_strategy: InstallStrategy,
    /// Artifact retention.
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// Reuse an existing artifact for an identical request.
    #[serde(default = "default_dedup")]
    pub dedup: bool,
    /// Directory inside the runtime under which run workspaces are created.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Period of the background expiry sweep, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_dedup() -> bool {
    true
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("/packy")
}

fn default_sweep_interval() -> u64 {
    60 * 60
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            install_strategy: InstallStrategy::default(),
            retention: RetentionPolicy::default(),
            dedup: default_dedup(),
            workspace_root: default_workspace_root(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl BundlerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PACKBUNDLER_REGISTRY_URL` | Registry base URL |
    /// | `PACKBUNDLER_REGISTRY_TIMEOUT` | Registry timeout in seconds |
    /// | `PACKBUNDLER_INSTALL_STRATEGY` | `nested` or `hoisted` (`flat`) |
    /// | `PACKBUNDLER_RETENTION_SECS` | Artifact retention in seconds |
    /// | `PACKBUNDLER_DEDUP` | `1`/`true` or `0`/`false` |
    /// | `PACKBUNDLER_WORKSPACE_ROOT` | Workspace root inside the runtime |
    /// | `PACKBUNDLER_SWEEP_INTERVAL_SECS` | Expiry sweep period |
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`] but reads variables through `lookup`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut registry = defaults.registry;
        if let Some(url) = get("PACKBUNDLER_REGISTRY_URL") {
            registry.url = url;
        }
        if let Some(secs) = get("PACKBUNDLER_REGISTRY_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            registry.timeout_secs = secs;
        }

        Self {
            registry,
            install_strategy: get("PACKBUNDLER_INSTALL_STRATEGY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.install_strategy),
            retention: get("PACKBUNDLER_RETENTION_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map_or(defaults.retention, |secs| {
                    RetentionPolicy::new(Duration::from_secs(secs))
                }),
            dedup: get("PACKBUNDLER_DEDUP")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.dedup),
            workspace_root: get("PACKBUNDLER_WORKSPACE_ROOT")
                .map_or(defaults.workspace_root, PathBuf::from),
            sweep_interval_secs: get("PACKBUNDLER_SWEEP_INTERVAL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.sweep_interval_secs),
        }
    }

    /// Sets the registry config.
    #[must_use]
    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the install strategy.
    #[must_use]
    pub fn with_install_strategy(mut self, strategy: InstallStrategy) -> Self {
        self.install_strategy = strategy;
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Enables or disables dedup.
    #[must_use]
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Sets the sweep period.
    #[must_use]
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    /// Sweep period as a `Duration`.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BundlerConfig::default();
        assert_eq!(config.install_strategy, InstallStrategy::Nested);
        assert_eq!(config.retention, RetentionPolicy::default());
        assert!(config.dedup);
        assert_eq!(config.workspace_root, PathBuf::from("/packy"));
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_from_lookup_reads_everything() {
        let config = BundlerConfig::from_lookup(lookup(&[
            ("PACKBUNDLER_REGISTRY_URL", "http://localhost:4873"),
            ("PACKBUNDLER_REGISTRY_TIMEOUT", "5"),
            ("PACKBUNDLER_INSTALL_STRATEGY", "flat"),
            ("PACKBUNDLER_RETENTION_SECS", "600"),
            ("PACKBUNDLER_DEDUP", "0"),
            ("PACKBUNDLER_WORKSPACE_ROOT", "/work"),
            ("PACKBUNDLER_SWEEP_INTERVAL_SECS", "30"),
        ]));

        assert_eq!(config.registry.url, "http://localhost:4873");
        assert_eq!(config.registry.timeout_secs, 5);
        assert_eq!(config.install_strategy, InstallStrategy::Hoisted);
        assert_eq!(config.retention.window, Duration::from_secs(600));
        assert!(!config.dedup);
        assert_eq!(config.workspace_root, PathBuf::from("/work"));
        assert_eq!(config.sweep_interval_secs, 30);
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = BundlerConfig::from_lookup(lookup(&[
            ("PACKBUNDLER_INSTALL_STRATEGY", "sideways"),
            ("PACKBUNDLER_RETENTION_SECS", "soon"),
            ("PACKBUNDLER_DEDUP", "maybe"),
            ("PACKBUNDLER_SWEEP_INTERVAL_SECS", "0"),
            ("PACKBUNDLER_WORKSPACE_ROOT", "  "),
        ]));
        assert_eq!(config, BundlerConfig::default());
    }

    #[test]
    fn test_install_strategy_parsing() {
        assert_eq!("Nested".parse::<InstallStrategy>(), Ok(InstallStrategy::Nested));
        assert_eq!("hoisted".parse::<InstallStrategy>(), Ok(InstallStrategy::Hoisted));
        assert!("tree".parse::<InstallStrategy>().is_err());

        let s: InstallStrategy = serde_json::from_str("\"flat\"").unwrap();
        assert_eq!(s, InstallStrategy::Hoisted);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"hoisted\"");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: BundlerConfig =
            serde_json::from_str(r#"{"dedup": false, "install_strategy": "hoisted"}"#).unwrap();
        assert!(!config.dedup);
        assert_eq!(config.install_strategy, InstallStrategy::Hoisted);
        assert_eq!(config.workspace_root, PathBuf::from("/packy"));
    }
}
