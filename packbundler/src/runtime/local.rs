//! Host-process runtime rooted at a local directory.

use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tracing::{debug, info};

use super::{SpawnedProcess, WorkspaceRuntime};
use crate::core::CommandSpec;
use crate::errors::RuntimeError;

/// Exit code reported when the program cannot be found.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Runs commands as host processes under a root directory.
///
/// The root stands in for the sandbox filesystem: the virtual path
/// `/packy/abc` maps to `<root>/packy/abc`. Children are killed when their
/// handles are dropped.
#[derive(Debug)]
pub struct LocalWorkspaceRuntime {
    root: PathBuf,
    mounted: AtomicBool,
}

impl LocalWorkspaceRuntime {
    /// Creates a runtime rooted at `root`. Nothing touches disk until [`WorkspaceRuntime::mount`].
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: AtomicBool::new(false),
        }
    }

    /// The host directory backing the workspace.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a virtual path onto the host, rejecting `..`.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, RuntimeError> {
        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    return Err(RuntimeError::InvalidPath {
                        path: path.to_path_buf(),
                    })
                }
            }
        }
        Ok(resolved)
    }

    fn ensure_mounted(&self) -> Result<(), RuntimeError> {
        if self.mounted.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RuntimeError::unavailable("workspace runtime is not mounted"))
        }
    }

    fn not_found(command: &CommandSpec, error: &std::io::Error) -> SpawnedProcess {
        let message = format!("{}: command not found ({error})\n", command.program);
        SpawnedProcess {
            stdout: Box::pin(tokio::io::empty()),
            stderr: Some(Box::pin(Cursor::new(message.into_bytes()))),
            exit: Box::pin(async { Ok(EXIT_COMMAND_NOT_FOUND) }),
        }
    }
}

#[async_trait]
impl WorkspaceRuntime for LocalWorkspaceRuntime {
    async fn mount(&self) -> Result<(), RuntimeError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            RuntimeError::unavailable(format!(
                "cannot create workspace root {}: {e}",
                self.root.display()
            ))
        })?;

        if !self.mounted.swap(true, Ordering::AcqRel) {
            info!(root = %self.root.display(), "local workspace runtime mounted");
        }
        Ok(())
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), RuntimeError> {
        self.ensure_mounted()?;
        let host = self.resolve(path)?;
        let result = if recursive {
            tokio::fs::create_dir_all(&host).await
        } else {
            tokio::fs::create_dir(&host).await
        };
        result.map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, RuntimeError> {
        self.ensure_mounted()?;
        let host = self.resolve(path)?;
        tokio::fs::read(&host)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), RuntimeError> {
        self.ensure_mounted()?;
        let host = self.resolve(path)?;
        tokio::fs::write(&host, contents)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn spawn(&self, command: &CommandSpec) -> Result<SpawnedProcess, RuntimeError> {
        self.ensure_mounted()?;
        let cwd = match &command.cwd {
            Some(cwd) => self.resolve(cwd)?,
            None => self.root.clone(),
        };
        if !tokio::fs::try_exists(&cwd).await.unwrap_or(false) {
            return Err(RuntimeError::NotFound {
                path: command.cwd.clone().unwrap_or_else(|| PathBuf::from("/")),
            });
        }

        debug!(command = %command, cwd = %cwd.display(), "spawning");

        let spawned = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::not_found(command, &e));
            }
            Err(e) => return Err(RuntimeError::from_io(cwd, e)),
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::unavailable("child stdout was not captured"))?;
        let stderr = child.stderr.take();

        Ok(SpawnedProcess {
            stdout: Box::pin(stdout),
            stderr: stderr.map(|s| Box::pin(s) as super::OutputStream),
            exit: Box::pin(async move {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| RuntimeError::Io {
                        path: PathBuf::from("<child>"),
                        source: e,
                    })?;
                Ok(status.code().unwrap_or(-1))
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mounted() -> (tempfile::TempDir, LocalWorkspaceRuntime) {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalWorkspaceRuntime::new(dir.path().join("sandbox"));
        runtime.mount().await.unwrap();
        (dir, runtime)
    }

    #[tokio::test]
    async fn test_fs_before_mount_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalWorkspaceRuntime::new(dir.path());
        let err = runtime.read_file(Path::new("/x")).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let (_dir, runtime) = mounted().await;
        runtime.mkdir(Path::new("/packy/run-1"), true).await.unwrap();
        runtime
            .write_file(Path::new("/packy/run-1/package.json"), b"{}")
            .await
            .unwrap();

        let bytes = runtime
            .read_file(Path::new("/packy/run-1/package.json"))
            .await
            .unwrap();
        assert_eq!(bytes, b"{}");
        assert!(runtime.root().join("packy/run-1/package.json").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_dir, runtime) = mounted().await;
        let err = runtime.read_file(Path::new("/nope.json")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_parent_components_rejected() {
        let (_dir, runtime) = mounted().await;
        let err = runtime
            .write_file(Path::new("/packy/../../etc/passwd"), b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_non_recursive_mkdir_requires_parent() {
        let (_dir, runtime) = mounted().await;
        assert!(runtime.mkdir(Path::new("/a/b/c"), false).await.is_err());
        runtime.mkdir(Path::new("/a"), false).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_program_exits_127() {
        let (_dir, runtime) = mounted().await;
        let process = runtime
            .spawn(&CommandSpec::new("definitely-not-a-real-program-xyz"))
            .await
            .unwrap();
        assert!(process.stderr.is_some());
        assert_eq!(process.exit.await.unwrap(), EXIT_COMMAND_NOT_FOUND);
    }
}
