//! Command specifications and captured process results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A command to spawn inside the workspace runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory inside the workspace.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Sets one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Returns true if the program matches and the arguments start with `prefix`.
    #[must_use]
    pub fn matches(&self, program: &str, prefix: &[&str]) -> bool {
        self.program == program
            && self.args.len() >= prefix.len()
            && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured outcome of one spawned command.
///
/// A non-zero `exit_code` is a normal result; interpretation is up to the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Exit code reported by the runtime.
    pub exit_code: i32,
    /// Everything written to stdout.
    pub stdout: String,
    /// Everything written to stderr.
    pub stderr: String,
}

impl ProcessResult {
    /// Creates a new result.
    #[must_use]
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr joined by a newline, trimmed.
    #[must_use]
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_display() {
        let cmd = CommandSpec::new("npm")
            .args(["install", "left-pad@1.3.0"])
            .arg("--ignore-scripts")
            .cwd("/packy/run")
            .env("npm_config_fund", "false");

        assert_eq!(cmd.to_string(), "npm install left-pad@1.3.0 --ignore-scripts");
        assert_eq!(cmd.cwd.as_deref(), Some(Path::new("/packy/run")));
        assert_eq!(cmd.env.get("npm_config_fund").map(String::as_str), Some("false"));
    }

    #[test]
    fn test_matches_prefix() {
        let cmd = CommandSpec::new("npm").args(["pack", "--silent"]);
        assert!(cmd.matches("npm", &["pack"]));
        assert!(cmd.matches("npm", &[]));
        assert!(!cmd.matches("npm", &["install"]));
        assert!(!cmd.matches("node", &["pack"]));
        assert!(!cmd.matches("npm", &["pack", "--silent", "extra"]));
    }

    #[test]
    fn test_process_result() {
        let ok = ProcessResult::new(0, "foo-1.0.0.tgz\n", "");
        assert!(ok.success());

        let failed = ProcessResult::new(1, "partial\n", "npm ERR! code E404\n");
        assert!(!failed.success());
        assert_eq!(failed.combined_output(), "partial\n\nnpm ERR! code E404");
    }
}
