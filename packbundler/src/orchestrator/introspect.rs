//! Best-effort facts about an installed workspace.
//!
//! Nothing here affects a run's outcome; results are only logged.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::core::CommandSpec;
use crate::errors::IntrospectionError;
use crate::process::ProcessRunner;
use crate::runtime::WorkspaceRuntime;

const NODE_MODULES: &str = "node_modules/";

/// How long a single version probe may take before it is abandoned.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tool versions reported inside the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolVersions {
    /// `node -v`
    pub node: Option<String>,
    /// `npm -v`
    pub npm: Option<String>,
}

impl ToolVersions {
    /// `Env: node X, npm Y`, or `None` when neither probe answered.
    #[must_use]
    pub fn summary_line(&self) -> Option<String> {
        if self.node.is_none() && self.npm.is_none() {
            return None;
        }
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "unknown".to_string());
        Some(format!("Env: node {}, npm {}", show(&self.node), show(&self.npm)))
    }
}

/// Runs `node -v` and `npm -v` concurrently in `cwd`.
///
/// A probe that has not answered within `limit` reports `None`.
pub async fn probe_tool_versions(runner: &ProcessRunner, cwd: &Path, limit: Duration) -> ToolVersions {
    let node = CommandSpec::new("node").arg("-v").cwd(cwd);
    let npm = CommandSpec::new("npm").arg("-v").cwd(cwd);
    let (node, npm) = tokio::join!(probe(runner, &node, limit), probe(runner, &npm, limit));
    ToolVersions { node, npm }
}

async fn probe(runner: &ProcessRunner, command: &CommandSpec, limit: Duration) -> Option<String> {
    let Ok(outcome) = tokio::time::timeout(limit, runner.run(command)).await else {
        debug!(command = %command, timeout_ms = limit.as_millis(), "version probe timed out");
        return None;
    };
    match outcome {
        Ok(result) if result.success() => {
            let version = result.stdout.trim();
            (!version.is_empty()).then(|| version.to_string())
        }
        Ok(result) => {
            debug!(command = %command, exit_code = result.exit_code, "version probe failed");
            None
        }
        Err(e) => {
            debug!(command = %command, error = %e, "version probe failed");
            None
        }
    }
}

/// Shape of the installed dependency tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStats {
    /// Installed entries in the lockfile.
    pub total: usize,
    /// Dependencies declared by the installed package.
    pub direct: usize,
    /// Distinct `name@version` pairs; `None` for lockfiles without `packages`.
    pub unique_versions: Option<usize>,
    /// Deepest `node_modules` nesting, at least 1.
    pub max_depth: usize,
}

impl DependencyStats {
    /// The progress line logged after install.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let unique = self
            .unique_versions
            .map_or_else(|| "n/a".to_string(), |n| n.to_string());
        format!(
            "Dependencies installed: {} packages (direct: {}, unique versions: {unique}, max depth: {}).",
            self.total, self.direct, self.max_depth
        )
    }
}

/// Computes [`DependencyStats`] from a `package-lock.json` and, optionally,
/// the installed package's manifest.
///
/// A manifest that is missing or unparseable counts zero direct dependencies.
pub fn dependency_stats(
    lockfile: &[u8],
    manifest: Option<&[u8]>,
) -> Result<DependencyStats, IntrospectionError> {
    let lock: Value = serde_json::from_slice(lockfile).map_err(|e| IntrospectionError::Malformed {
        reason: e.to_string(),
    })?;
    let Some(lock) = lock.as_object() else {
        return Err(IntrospectionError::Malformed {
            reason: "lockfile is not a JSON object".to_string(),
        });
    };

    let direct = manifest
        .and_then(|raw| serde_json::from_slice::<Value>(raw).ok())
        .and_then(|m| m.get("dependencies").and_then(Value::as_object).map(serde_json::Map::len))
        .unwrap_or(0);

    if let Some(packages) = lock.get("packages").and_then(Value::as_object) {
        let installed: Vec<(&String, &Value)> = packages
            .iter()
            .filter(|(key, _)| key.starts_with(NODE_MODULES))
            .collect();

        let max_depth = installed
            .iter()
            .map(|(key, _)| key.split(NODE_MODULES).filter(|s| !s.is_empty()).count())
            .max()
            .unwrap_or(0)
            .max(1);

        let unique: HashSet<String> = installed
            .iter()
            .filter_map(|(key, entry)| {
                let version = entry.get("version")?.as_str()?;
                Some(format!("{}@{version}", package_name(key)))
            })
            .collect();

        return Ok(DependencyStats {
            total: installed.len(),
            direct,
            unique_versions: Some(unique.len()),
            max_depth,
        });
    }

    let total = lock
        .get("dependencies")
        .and_then(Value::as_object)
        .map_or(0, serde_json::Map::len);

    Ok(DependencyStats {
        total,
        direct,
        unique_versions: None,
        max_depth: 1,
    })
}

/// Package name of a lockfile key: the segment after the last `node_modules/`.
fn package_name(key: &str) -> &str {
    key.rsplit_once(NODE_MODULES).map_or(key, |(_, name)| name)
}

/// Reads the workspace lockfile and installed manifest and computes stats.
pub async fn read_dependency_stats(
    runtime: &dyn WorkspaceRuntime,
    workspace: &Path,
    package: &str,
) -> Result<DependencyStats, IntrospectionError> {
    let lockfile = runtime.read_file(&workspace.join("package-lock.json")).await?;
    let manifest_path = workspace.join("node_modules").join(package).join("package.json");
    let manifest = runtime.read_file(&manifest_path).await.ok();
    dependency_stats(&lockfile, manifest.as_deref())
}
