// src/exec/backend.rs

//! Pluggable command runner abstraction.
//!
//! - `ProcessRunner` is the default implementation used by `cyclerun`.
//! - Tests provide their own `CommandRunner` that, for example, replies to
//!   `sbatch` with a canned "Submitted batch job" line and records the
//!   arguments it was called with.

use std::fmt::Debug;
use std::io;
use std::path::Path;

/// Captured result of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Trait abstracting how external commands are run.
///
/// Calls block the current thread until the command exits.
pub trait CommandRunner: Send + Sync + Debug {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> io::Result<CommandOutput>;
}
