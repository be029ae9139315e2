//! Process execution for task closures.
//!
//! Tasks shell out to compilers, package managers and test runners. Output
//! is captured rather than streamed so a failing target can report what the
//! process printed.

use crate::{Error, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Lines of stderr kept in the error of a failed process.
const FAILURE_SNIPPET_LINES: usize = 20;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Program that was run
    pub program: String,
    /// Exit code, `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the process exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Turn a non-zero exit into a task failure of `target`, carrying the
    /// tail of stderr.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Task`] if the process did not exit with code 0.
    pub fn ensure_success(self, target: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }

        let code = self
            .exit_code
            .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
        let lines: Vec<&str> = self.stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(FAILURE_SNIPPET_LINES)..].join("\n");
        let mut message = format!("{} exited with {code}", self.program);
        if !tail.is_empty() {
            message.push('\n');
            message.push_str(&keel_events::redact(&tail));
        }
        Err(Error::task(target, message))
    }
}

/// Run `program` to completion with stdin closed, capturing stdout and
/// stderr.
///
/// # Errors
///
/// Returns [`Error::Io`] if the process cannot be spawned. A non-zero exit
/// is not an error; see [`ProcessOutput::ensure_success`].
pub async fn run_process<I, S>(
    program: &str,
    args: I,
    working_dir: Option<&Path>,
) -> Result<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let command_line = args.iter().fold(program.to_string(), |mut line, arg| {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
        line
    });
    tracing::debug!(command = %keel_events::redact(&command_line), "Running process");

    let mut cmd = Command::new(program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await.map_err(|e| {
        Error::io(
            e,
            working_dir.map(Path::to_path_buf),
            format!("spawn {program}"),
        )
    })?;

    let result = ProcessOutput {
        program: program.to_string(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    tracing::debug!(program, exit_code = ?result.exit_code, "Process finished");
    Ok(result)
}
