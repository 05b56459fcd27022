//! One bundling run, step by step.

use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument, Span};
use uuid::Uuid;

use super::introspect::{probe_tool_versions, read_dependency_stats, PROBE_TIMEOUT};
use super::patch::{patch_manifest, render_manifest};
use super::{BundleOrchestrator, BundleOutcome, BundleStatus};
use crate::config::InstallStrategy;
use crate::core::{
    ArtifactMeta, ArtifactRecord, CommandSpec, PackageRequest, ProcessResult, StageId, StageStatus,
};
use crate::errors::{BundleError, RuntimeError};
use crate::events::{BundleEvent, LogLevel};
use crate::naming::parse_artifact_name;
use crate::observability::{bundle_span, StageTimer};
use crate::registry::resolve_tag;
use crate::timeline::TimelineHandle;
use crate::utils::generate_run_id;

enum Completion {
    Bundled(ArtifactRecord),
    Deduplicated(ArtifactRecord),
}

pub(super) struct Run<'a> {
    orchestrator: &'a BundleOrchestrator,
    request: PackageRequest,
    timeline: &'a TimelineHandle,
    run_id: Option<Uuid>,
}

impl<'a> Run<'a> {
    pub(super) fn new(
        orchestrator: &'a BundleOrchestrator,
        request: PackageRequest,
        timeline: &'a TimelineHandle,
    ) -> Self {
        Self {
            orchestrator,
            request,
            timeline,
            run_id: None,
        }
    }

    pub(super) async fn execute(mut self) -> BundleOutcome {
        self.timeline.reset();
        let span = bundle_span(&self.request);

        let result = AssertUnwindSafe(self.steps())
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|panic| Err(BundleError::unexpected(panic_message(panic.as_ref()))));

        span.in_scope(|| self.finish(result))
    }

    async fn steps(&mut self) -> Result<Completion, BundleError> {
        self.resolve_latest().await;
        self.publish(BundleEvent::Started {
            request: self.request.clone(),
        });
        self.log(format!("Starting build: {}", self.request));

        if let Some(existing) = self.existing_artifact().await {
            return Ok(Completion::Deduplicated(existing));
        }

        self.boot().await?;
        let workspace = self.setup().await?;
        self.install(&workspace).await?;
        if let Err(panic) = AssertUnwindSafe(self.introspect(&workspace)).catch_unwind().await {
            warn!(panic = %panic_message(panic.as_ref()), "install introspection panicked");
        }
        let package_dir = self.patch(&workspace).await?;
        let record = self.pack(&package_dir).await?;

        let timer = self.begin(StageId::Done);
        self.log(format!(
            "Done. {} is ready to download ({}).",
            record.name(),
            record.entry.integrity.as_deref().unwrap_or("no integrity")
        ));
        self.complete(timer, None);
        Ok(Completion::Bundled(record))
    }

    async fn resolve_latest(&mut self) {
        if !self.request.is_latest() {
            return;
        }
        let Some(registry) = self.orchestrator.registry.as_ref() else {
            return;
        };

        let versions = registry.list_versions(&self.request.name).await;
        if let Some(latest) = resolve_tag(&versions, PackageRequest::LATEST) {
            info!(resolved = %latest.version, "resolved latest dist-tag");
            Span::current().record("version", tracing::field::display(&latest.version));
            self.request = PackageRequest::new(self.request.name.clone(), latest.version.clone());
        } else {
            debug!("latest dist-tag not found; installing the tag as given");
        }
    }

    async fn existing_artifact(&self) -> Option<ArtifactRecord> {
        if !self.orchestrator.config.dedup {
            return None;
        }
        let existing = self
            .orchestrator
            .artifacts
            .find(&self.request.name, &self.request.version)
            .await?;

        self.log(format!(
            "A download for {} already exists: {}. Skipping bundle.",
            self.request,
            existing.name()
        ));
        let timer = self.begin(StageId::Done);
        self.complete(timer, Some(existing.name()));
        self.publish(BundleEvent::Deduplicated {
            request: self.request.clone(),
            artifact_id: existing.id().to_string(),
            name: existing.name().to_string(),
        });
        Some(existing)
    }

    async fn boot(&self) -> Result<(), BundleError> {
        let timer = self.begin(StageId::Boot);
        self.log("Booting workspace runtime...");

        self.orchestrator.runtime.mount().await.map_err(|e| match e {
            RuntimeError::Unavailable { reason } => BundleError::RuntimeUnavailable { reason },
            other => BundleError::RuntimeUnavailable {
                reason: other.to_string(),
            },
        })?;

        self.complete(timer, None);
        Ok(())
    }

    async fn setup(&mut self) -> Result<PathBuf, BundleError> {
        let timer = self.begin(StageId::Setup);
        self.log("Setting up isolated workspace...");

        let run_id = generate_run_id();
        self.run_id = Some(run_id);
        Span::current().record("run_id", tracing::field::display(run_id));

        let workspace = self.orchestrator.config.workspace_root.join(run_id.to_string());
        self.orchestrator.runtime.mkdir(&workspace, true).await?;

        let init = quiet_npm(&workspace).args(["init", "-y"]);
        let result = self.orchestrator.runner.run(&init).await?;
        if !result.success() {
            let headline = format!(
                "Failed to initialize workspace (npm init). Exit code: {}",
                result.exit_code
            );
            let detail = result.stderr.clone();
            return Err(self.command_failed(StageId::Setup, &init, &result, headline, detail));
        }

        self.log(format!("Workspace ready (run: {run_id})."));
        self.complete(timer, None);
        Ok(workspace)
    }

    async fn install(&self, workspace: &Path) -> Result<(), BundleError> {
        let timer = self.begin(StageId::Install);
        self.log(format!(
            "Resolving and installing dependencies for {}...",
            self.request
        ));

        let strategy = self.orchestrator.config.install_strategy;
        if strategy == InstallStrategy::Hoisted {
            warn!(
                "hoisted installs place dependencies outside the package directory; \
                 the archive will not contain them"
            );
        }
        let install = quiet_npm(workspace)
            .arg("install")
            .arg(self.request.install_spec())
            .arg(format!("--install-strategy={}", strategy.as_flag()))
            .arg("--ignore-scripts")
            .env("npm_config_ignore_scripts", "true")
            .env("npm_config_progress", "false");

        let result = self.orchestrator.runner.run(&install).await?;
        if !result.success() {
            let headline = format!("Install failed with exit code {}.", result.exit_code);
            let detail = result.stderr.clone();
            return Err(self.command_failed(StageId::Install, &install, &result, headline, detail));
        }

        self.complete(timer, None);
        self.log(format!("Installed {} successfully.", self.request));
        Ok(())
    }

    async fn introspect(&self, workspace: &Path) {
        let tools = probe_tool_versions(&self.orchestrator.runner, workspace, PROBE_TIMEOUT).await;
        if let Some(line) = tools.summary_line() {
            self.log(line);
        }

        match read_dependency_stats(&*self.orchestrator.runtime, workspace, &self.request.name).await {
            Ok(stats) => self.log(stats.summary_line()),
            Err(e) => {
                debug!(error = %e, "dependency stats unavailable");
                self.log("Dependencies installed: count unavailable (no lockfile).");
            }
        }
    }

    async fn patch(&self, workspace: &Path) -> Result<PathBuf, BundleError> {
        let timer = self.begin(StageId::Patch);
        self.log("Preparing package for packing (disabling lifecycle hooks)...");

        let package_dir = workspace.join("node_modules").join(&self.request.name);
        let manifest_path = package_dir.join("package.json");

        if let Err(e) = self.rewrite_manifest(&manifest_path).await {
            self.log_error(format!("Could not patch package.json: {e}"));
            return Err(e);
        }

        self.log("Package metadata patched for reproducible pack.");
        self.complete(timer, None);
        Ok(package_dir)
    }

    async fn rewrite_manifest(&self, path: &Path) -> Result<(), BundleError> {
        let runtime = &self.orchestrator.runtime;
        let manifest_error = |e: RuntimeError| match e {
            RuntimeError::Unavailable { reason } => BundleError::RuntimeUnavailable { reason },
            other => BundleError::ManifestError {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        };

        let raw = runtime.read_file(path).await.map_err(manifest_error)?;
        let manifest: Value = serde_json::from_slice(&raw).map_err(|e| BundleError::ManifestError {
            path: path.to_path_buf(),
            reason: format!("invalid JSON: {e}"),
        })?;

        let patched = patch_manifest(manifest, path)?;
        let bytes = render_manifest(&patched, path)?;
        runtime.write_file(path, &bytes).await.map_err(manifest_error)
    }

    async fn pack(&self, package_dir: &Path) -> Result<ArtifactRecord, BundleError> {
        let timer = self.begin(StageId::Pack);
        self.log("Creating tarball (npm pack)...");

        let pack = quiet_npm(package_dir)
            .args(["pack", "--silent"])
            .env("npm_config_ignore_scripts", "true")
            .env("npm_config_progress", "false")
            .env("npm_config_git", "false");

        let result = self.orchestrator.runner.run(&pack).await?;
        if !result.success() {
            let headline = format!("npm pack failed with exit code {}.", result.exit_code);
            let detail = result.combined_output();
            return Err(self.command_failed(StageId::Pack, &pack, &result, headline, detail));
        }

        let Some(name) = parse_artifact_name(&result.stdout) else {
            self.log_error("Could not determine tarball filename from npm pack output.");
            return Err(BundleError::ArtifactNameUnresolved {
                stdout: result.stdout,
            });
        };

        let tarball_path = package_dir.join(&name);
        self.log(format!("Tarball created at: {}", tarball_path.display()));

        let bytes = self.orchestrator.runtime.read_file(&tarball_path).await?;
        let archive_name = tarball_path
            .file_name()
            .map_or_else(|| name.clone(), |n| n.to_string_lossy().into_owned());

        let mut meta = ArtifactMeta::new(&self.request.name, &self.request.version);
        if let Some(run_id) = self.run_id {
            meta = meta.with_extra("run_id", Value::String(run_id.to_string()));
        }
        let record = self
            .orchestrator
            .artifacts
            .register(bytes, archive_name, meta)
            .await?;

        let kb = ((record.entry.size_bytes + 512) / 1024).max(1);
        let retention = self.orchestrator.artifacts.retention();
        let kept = if retention.expires_at(record.created_at()).is_some() {
            format!("It will be kept for {}", describe_window(retention.window))
        } else {
            "It will be kept indefinitely".to_string()
        };
        self.log(format!("Download ready: {} ({kb} KB). {kept}.", record.name()));

        self.complete(timer, Some(record.name()));
        Ok(record)
    }

    fn command_failed(
        &self,
        stage: StageId,
        command: &CommandSpec,
        result: &ProcessResult,
        headline: String,
        detail: String,
    ) -> BundleError {
        self.log_error(headline);
        if !detail.trim().is_empty() {
            self.log_error(detail.trim());
        }
        BundleError::CommandFailed {
            stage,
            command: command.to_string(),
            exit_code: result.exit_code,
            stderr: detail,
        }
    }

    fn begin(&self, stage: StageId) -> StageTimer {
        if !self.timeline.start(stage) {
            warn!(stage = %stage, "stage transition refused");
        }
        info!(stage = %stage, "stage started");
        self.publish(BundleEvent::StageStarted {
            run: self.run_id,
            stage,
        });
        StageTimer::start(stage)
    }

    fn complete(&self, timer: StageTimer, note: Option<&str>) {
        let stage = timer.stage();
        self.timeline.succeed(stage, note);
        let duration_ms = timer.finish();
        info!(stage = %stage, duration_ms, "stage completed");
        self.publish(BundleEvent::StageCompleted {
            run: self.run_id,
            stage,
            note: note.map(str::to_string),
            duration_ms,
        });
    }

    // A stage that already finished is never blamed; a failure between two
    // stages belongs to the next one due.
    fn attribute(&self, error: &BundleError) -> StageId {
        let snapshot = self.timeline.snapshot();
        let finished = |id: StageId| {
            snapshot
                .stage(id)
                .is_some_and(|s| s.status == StageStatus::Done)
        };

        self.timeline
            .active()
            .or_else(|| error.stage_hint().filter(|id| !finished(*id)))
            .or_else(|| StageId::ORDER.into_iter().find(|id| !finished(*id)))
            .unwrap_or(StageId::Done)
    }

    fn finish(self, result: Result<Completion, BundleError>) -> BundleOutcome {
        let (status, artifact) = match result {
            Ok(Completion::Bundled(record)) => (BundleStatus::Bundled, Some(record)),
            Ok(Completion::Deduplicated(record)) => (BundleStatus::Deduplicated, Some(record)),
            Err(error) => {
                let stage = self.attribute(&error);
                self.report_failure(stage, &error);
                (BundleStatus::Failed { stage, error }, None)
            }
        };

        info!(status = status.as_str(), "bundle finished");
        self.publish(BundleEvent::Completed {
            run: self.run_id,
            request: self.request.clone(),
            status: status.as_str().to_string(),
            artifact_id: artifact.as_ref().map(|a| a.id().to_string()),
        });

        BundleOutcome {
            run_id: self.run_id,
            request: self.request,
            status,
            timeline: self.timeline.snapshot(),
            artifact,
        }
    }

    fn report_failure(&self, stage: StageId, error: &BundleError) {
        let note = error.timeline_note();
        self.timeline.fail(stage, Some(&note));
        error!(stage = %stage, kind = error.kind(), error = %error, "bundle failed");

        if let BundleError::UnexpectedFailure { message } = error {
            self.log_error(format!("Unexpected error: {message}"));
        }
        if let Some(tip) = error.remediation() {
            self.log(format!("Tip: {tip}"));
        }
        self.publish(BundleEvent::StageFailed {
            run: self.run_id,
            stage,
            kind: error.kind().to_string(),
            note,
        });
    }

    fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.publish(BundleEvent::Log {
            run: self.run_id,
            level: LogLevel::Info,
            line,
        });
    }

    fn log_error(&self, line: impl Into<String>) {
        let line = line.into();
        warn!("{line}");
        self.publish(BundleEvent::Log {
            run: self.run_id,
            level: LogLevel::Error,
            line,
        });
    }

    fn publish(&self, event: BundleEvent) {
        self.orchestrator.events.publish(&event);
    }
}

/// An npm invocation in `cwd` with funding and audit chatter turned off.
fn quiet_npm(cwd: &Path) -> CommandSpec {
    CommandSpec::new("npm")
        .cwd(cwd)
        .env("npm_config_fund", "false")
        .env("npm_config_audit", "false")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "pipeline step panicked".to_string()
    }
}

fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    let (count, unit) = match secs {
        0 => return format!("{} ms", window.as_millis()),
        s if s % 86_400 == 0 => (s / 86_400, "day"),
        s if s % 3_600 == 0 => (s / 3_600, "hour"),
        s if s % 60 == 0 => (s / 60, "minute"),
        s => (s, "second"),
    };
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_window() {
        assert_eq!(describe_window(Duration::from_secs(7 * 86_400)), "7 days");
        assert_eq!(describe_window(Duration::from_secs(3_600)), "1 hour");
        assert_eq!(describe_window(Duration::from_secs(90)), "90 seconds");
        assert_eq!(describe_window(Duration::from_secs(120)), "2 minutes");
        assert_eq!(describe_window(Duration::from_millis(20)), "20 ms");
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "pipeline step panicked");
    }
}
