//! The workspace runtime boundary.
//!
//! A [`WorkspaceRuntime`] is the isolated environment that owns the workspace
//! filesystem and runs installer processes. Paths passed to it are virtual
//! absolute paths (`/packy/<run id>/...`) inside that environment.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::core::CommandSpec;
use crate::errors::RuntimeError;

mod local;

pub use local::LocalWorkspaceRuntime;

/// A boxed output stream of a spawned process.
pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;

/// Handle to a running process.
///
/// Both streams must be read to EOF before awaiting `exit`, or a child
/// writing more than a pipe buffer worth of output will block forever.
pub struct SpawnedProcess {
    /// Standard output.
    pub stdout: OutputStream,
    /// Standard error, when the runtime keeps it separate.
    pub stderr: Option<OutputStream>,
    /// Resolves to the exit code.
    pub exit: BoxFuture<'static, Result<i32, RuntimeError>>,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// Abstract sandbox with a filesystem and process spawning.
#[async_trait]
pub trait WorkspaceRuntime: Send + Sync {
    /// Brings the runtime up. Fails with [`RuntimeError::Unavailable`] if it cannot be reached.
    async fn mount(&self) -> Result<(), RuntimeError>;

    /// Creates a directory.
    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), RuntimeError>;

    /// Reads a whole file.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, RuntimeError>;

    /// Writes a whole file, replacing any previous content.
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), RuntimeError>;

    /// Spawns a command.
    async fn spawn(&self, command: &CommandSpec) -> Result<SpawnedProcess, RuntimeError>;
}
