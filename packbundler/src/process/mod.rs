//! Runs one command to completion inside the workspace runtime.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::core::{CommandSpec, ProcessResult};
use crate::errors::RuntimeError;
use crate::runtime::{OutputStream, SpawnedProcess, WorkspaceRuntime};

/// Spawns commands and collects their output.
#[derive(Clone)]
pub struct ProcessRunner {
    runtime: Arc<dyn WorkspaceRuntime>,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner").finish_non_exhaustive()
    }
}

impl ProcessRunner {
    /// Creates a runner over `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn WorkspaceRuntime>) -> Self {
        Self { runtime }
    }

    /// Runs `command` and returns its exit code and captured output.
    ///
    /// A non-zero exit code is a normal result. Errors mean the runtime
    /// itself failed to spawn or report on the process.
    pub async fn run(&self, command: &CommandSpec) -> Result<ProcessResult, RuntimeError> {
        let started = Instant::now();
        let SpawnedProcess {
            stdout,
            stderr,
            exit,
        } = self.runtime.spawn(command).await?;

        let origin = command
            .cwd
            .as_deref()
            .unwrap_or_else(|| Path::new("/"));

        let (stdout, stderr) = tokio::join!(drain(Some(stdout)), drain(stderr));
        let stdout = stdout.map_err(|e| RuntimeError::from_io(origin, e))?;
        let stderr = stderr.map_err(|e| RuntimeError::from_io(origin, e))?;

        let exit_code = exit.await?;

        debug!(
            program = %command.program,
            args = ?command.args,
            cwd = %origin.display(),
            exit_code,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "command finished"
        );

        Ok(ProcessResult::new(
            exit_code,
            String::from_utf8_lossy(&stdout),
            String::from_utf8_lossy(&stderr),
        ))
    }
}

async fn drain(stream: Option<OutputStream>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::runtime::LocalWorkspaceRuntime;

    async fn runner() -> (tempfile::TempDir, ProcessRunner) {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalWorkspaceRuntime::new(dir.path());
        runtime.mount().await.unwrap();
        (dir, ProcessRunner::new(Arc::new(runtime)))
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let (_dir, runner) = runner().await;
        let result = runner.run(&sh("echo out; echo err >&2")).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_result() {
        let (_dir, runner) = runner().await;
        let result = runner.run(&sh("echo nope >&2; exit 3")).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr.trim(), "nope");
    }

    #[tokio::test]
    async fn test_env_and_cwd_applied() {
        let (dir, runner) = runner().await;
        std::fs::create_dir_all(dir.path().join("packy/run")).unwrap();

        let cmd = sh("printf '%s ' \"$PB_TEST\"; basename \"$(pwd)\"")
            .cwd("/packy/run")
            .env("PB_TEST", "hello");
        let result = runner.run(&cmd).await.unwrap();
        assert_eq!(result.stdout, "hello run\n");
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        let (_dir, runner) = runner().await;
        // Well past a 64 KiB pipe buffer on both streams.
        let script = "i=0; while [ $i -lt 4000 ]; do \
                      echo 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx'; \
                      echo 'yyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyy' >&2; \
                      i=$((i+1)); done";

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            runner.run(&sh(script)),
        )
        .await
        .expect("runner deadlocked")
        .unwrap();

        assert!(result.success());
        assert_eq!(result.stdout.lines().count(), 4000);
        assert_eq!(result.stderr.lines().count(), 4000);
    }

    #[tokio::test]
    async fn test_missing_program_is_exit_127() {
        let (_dir, runner) = runner().await;
        let result = runner
            .run(&CommandSpec::new("no-such-binary-for-sure"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 127);
        assert!(result.stderr.contains("no-such-binary-for-sure"));
    }

    #[tokio::test]
    async fn test_lossy_utf8() {
        let (_dir, runner) = runner().await;
        let result = runner.run(&sh("printf 'a\\377b'")).await.unwrap();
        assert_eq!(result.stdout, "a\u{FFFD}b");
    }
}
