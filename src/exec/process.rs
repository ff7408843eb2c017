// src/exec/process.rs

//! Blocking process runner.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, trace};

use super::backend::{CommandOutput, CommandRunner};

/// Runs commands with `std::process::Command`, capturing stdout and stderr.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> io::Result<CommandOutput> {
        trace!(program, ?args, ?cwd, "running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output()?;
        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(program, exit_code = ?result.code, "command exited");
        Ok(result)
    }
}

/// Program and arguments that run `line` through the platform shell.
pub fn shell_command(line: &str) -> (String, Vec<String>) {
    if cfg!(windows) {
        ("cmd".to_string(), vec!["/C".to_string(), line.to_string()])
    } else {
        ("sh".to_string(), vec!["-c".to_string(), line.to_string()])
    }
}
