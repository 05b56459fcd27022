//! Scripted in-memory workspace runtime.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::core::{CommandSpec, ProcessResult};
use crate::errors::RuntimeError;
use crate::runtime::{SpawnedProcess, WorkspaceRuntime};

/// Exit code reported for commands nothing was scripted for.
pub const EXIT_NOT_SCRIPTED: i32 = 127;

/// One canned reply to a spawned command.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    program: String,
    prefix: Vec<String>,
    result: ProcessResult,
    writes: Vec<(PathBuf, Vec<u8>)>,
    panics: bool,
    hang: Option<Duration>,
}

impl ScriptedResponse {
    /// Replies to `program` invoked with arguments starting with `prefix`.
    /// Defaults to exit 0 with no output.
    #[must_use]
    pub fn new(program: impl Into<String>, prefix: &[&str]) -> Self {
        Self {
            program: program.into(),
            prefix: prefix.iter().map(|p| (*p).to_string()).collect(),
            result: ProcessResult::new(0, "", ""),
            writes: Vec::new(),
            panics: false,
            hang: None,
        }
    }

    /// Sets the exit code.
    #[must_use]
    pub fn exit(mut self, code: i32) -> Self {
        self.result.exit_code = code;
        self
    }

    /// Sets stdout.
    #[must_use]
    pub fn stdout(mut self, stdout: impl Into<String>) -> Self {
        self.result.stdout = stdout.into();
        self
    }

    /// Sets stderr.
    #[must_use]
    pub fn stderr(mut self, stderr: impl Into<String>) -> Self {
        self.result.stderr = stderr.into();
        self
    }

    /// Writes a file when the command runs. Relative paths resolve against the command's cwd.
    #[must_use]
    pub fn writes(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.writes.push((path.into(), contents.into()));
        self
    }

    /// Makes the spawn call panic instead of replying.
    #[must_use]
    pub fn panics(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Delays the exit status by `delay`, like a process that stops responding.
    #[must_use]
    pub fn hangs_for(mut self, delay: Duration) -> Self {
        self.hang = Some(delay);
        self
    }

    fn matches(&self, command: &CommandSpec) -> bool {
        let prefix: Vec<&str> = self.prefix.iter().map(String::as_str).collect();
        command.matches(&self.program, &prefix)
    }
}

/// A call observed by [`ScriptedRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// `mount`
    Mount,
    /// `mkdir`
    Mkdir(PathBuf),
    /// `read_file`
    ReadFile(PathBuf),
    /// `write_file`
    WriteFile(PathBuf),
    /// `spawn`
    Spawn(CommandSpec),
}

#[derive(Debug, Default)]
struct Fs {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl Fs {
    fn add_dirs(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn write(&mut self, path: PathBuf, contents: Vec<u8>) {
        if let Some(parent) = path.parent() {
            self.add_dirs(parent);
        }
        self.files.insert(path, contents);
    }
}

/// Workspace runtime backed by an in-memory filesystem and canned command replies.
///
/// Later scripted responses take precedence over earlier ones, so a test can
/// load a fixture and then override a single command.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    fs: Mutex<Fs>,
    responses: Mutex<Vec<ScriptedResponse>>,
    calls: Mutex<Vec<RuntimeCall>>,
    unavailable: AtomicBool,
}

impl ScriptedRuntime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scripted response.
    pub fn script(&self, response: ScriptedResponse) -> &Self {
        self.responses.lock().push(response);
        self
    }

    /// When `true`, every operation fails with [`RuntimeError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Puts a file into the filesystem.
    pub fn put_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.fs.lock().write(path.into(), contents.into());
    }

    /// Returns a file's contents.
    #[must_use]
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.fs.lock().files.get(path.as_ref()).cloned()
    }

    /// Returns true if `path` was created as a directory.
    #[must_use]
    pub fn has_dir(&self, path: impl AsRef<Path>) -> bool {
        self.fs.lock().dirs.contains(path.as_ref())
    }

    /// Every call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().clone()
    }

    /// Every spawned command in order.
    #[must_use]
    pub fn spawned(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Spawn(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `mount` calls.
    #[must_use]
    pub fn mount_count(&self) -> usize {
        self.count(|call| matches!(call, RuntimeCall::Mount))
    }

    /// Number of `mkdir` calls.
    #[must_use]
    pub fn mkdir_count(&self) -> usize {
        self.count(|call| matches!(call, RuntimeCall::Mkdir(_)))
    }

    fn count(&self, pred: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    fn record(&self, call: RuntimeCall) -> Result<(), RuntimeError> {
        self.calls.lock().push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RuntimeError::unavailable("scripted runtime is offline"));
        }
        Ok(())
    }
}

fn check_path(path: &Path) -> Result<(), RuntimeError> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(RuntimeError::InvalidPath {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[async_trait]
impl WorkspaceRuntime for ScriptedRuntime {
    async fn mount(&self) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Mount)
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Mkdir(path.to_path_buf()))?;
        check_path(path)?;

        let mut fs = self.fs.lock();
        if !recursive {
            if let Some(parent) = path.parent() {
                let is_root = parent.parent().is_none();
                if !is_root && !fs.dirs.contains(parent) {
                    return Err(RuntimeError::NotFound {
                        path: parent.to_path_buf(),
                    });
                }
            }
        }
        fs.add_dirs(path);
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, RuntimeError> {
        self.record(RuntimeCall::ReadFile(path.to_path_buf()))?;
        check_path(path)?;
        self.file(path).ok_or_else(|| RuntimeError::NotFound {
            path: path.to_path_buf(),
        })
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::WriteFile(path.to_path_buf()))?;
        check_path(path)?;
        self.fs.lock().write(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    async fn spawn(&self, command: &CommandSpec) -> Result<SpawnedProcess, RuntimeError> {
        self.record(RuntimeCall::Spawn(command.clone()))?;

        let response = self
            .responses
            .lock()
            .iter()
            .rev()
            .find(|r| r.matches(command))
            .cloned();

        let hang = response.as_ref().and_then(|r| r.hang);
        let result = match response {
            Some(response) => {
                if response.panics {
                    panic!("scripted panic while spawning `{command}`");
                }
                let cwd = command.cwd.clone().unwrap_or_else(|| PathBuf::from("/"));
                let mut fs = self.fs.lock();
                for (path, contents) in response.writes {
                    fs.write(cwd.join(path), contents);
                }
                response.result
            }
            None => ProcessResult::new(
                EXIT_NOT_SCRIPTED,
                "",
                format!("command not scripted: {command}"),
            ),
        };

        let exit_code = result.exit_code;
        Ok(SpawnedProcess {
            stdout: Box::pin(Cursor::new(result.stdout.into_bytes())),
            stderr: Some(Box::pin(Cursor::new(result.stderr.into_bytes()))),
            exit: async move {
                if let Some(delay) = hang {
                    tokio::time::sleep(delay).await;
                }
                Ok(exit_code)
            }
            .boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessRunner;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_last_matching_response_wins() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime
            .script(ScriptedResponse::new("npm", &["pack"]).stdout("first"))
            .script(ScriptedResponse::new("npm", &["pack"]).exit(1).stderr("second"));

        let runner = ProcessRunner::new(runtime.clone());
        let result = runner
            .run(&CommandSpec::new("npm").args(["pack", "--silent"]))
            .await
            .unwrap();

        assert_eq!(result, ProcessResult::new(1, "", "second"));
        assert_eq!(runtime.spawned().len(), 1);
    }

    #[tokio::test]
    async fn test_writes_resolve_against_cwd() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.script(ScriptedResponse::new("npm", &["init"]).writes("package.json", "{}"));

        let runner = ProcessRunner::new(runtime.clone());
        runner
            .run(&CommandSpec::new("npm").arg("init").cwd("/packy/run"))
            .await
            .unwrap();

        assert_eq!(runtime.file("/packy/run/package.json"), Some(b"{}".to_vec()));
        assert!(runtime.has_dir("/packy/run"));
    }

    #[tokio::test]
    async fn test_unscripted_command_exits_127() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let result = ProcessRunner::new(runtime)
            .run(&CommandSpec::new("yarn"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, EXIT_NOT_SCRIPTED);
        assert!(result.stderr.contains("yarn"));
    }

    #[tokio::test]
    async fn test_unavailable_rejects_everything() {
        let runtime = ScriptedRuntime::new();
        runtime.set_unavailable(true);
        assert!(runtime.mount().await.unwrap_err().is_unavailable());
        assert!(runtime.read_file(Path::new("/x")).await.unwrap_err().is_unavailable());
        assert_eq!(runtime.mount_count(), 1);
    }

    #[tokio::test]
    async fn test_mkdir_non_recursive_needs_parent() {
        let runtime = ScriptedRuntime::new();
        assert!(matches!(
            runtime.mkdir(Path::new("/a/b"), false).await,
            Err(RuntimeError::NotFound { .. })
        ));
        runtime.mkdir(Path::new("/a/b"), true).await.unwrap();
        runtime.mkdir(Path::new("/a/b/c"), false).await.unwrap();
        assert!(runtime.has_dir("/a"));
        assert_eq!(runtime.mkdir_count(), 3);
    }

    #[tokio::test]
    async fn test_parent_dir_paths_rejected() {
        let runtime = ScriptedRuntime::new();
        assert!(matches!(
            runtime.read_file(Path::new("/packy/../etc/passwd")).await,
            Err(RuntimeError::InvalidPath { .. })
        ));
    }
}
