//! Subprocess invocation for external CLIs (`gh`, `git`, `yamale`).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::cancel::OrCancelExt;
use crate::error::{Error, ErrorKind, Result, ResultExt};

/// Captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    /// `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout and stderr joined, trimmed.
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs commands in a fixed working directory.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    cwd: Option<PathBuf>,
}

impl Shell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Run `program args…` to completion, capturing stdout and stderr
    /// whatever the exit status. The child is killed if `cancel` fires first.
    pub async fn capture(
        &self,
        program: &str,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        let shown = display_command(program, args);
        tracing::debug!(command = %shown, "running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .or_cancel(cancel)
            .await?
            .or_kind(ErrorKind::Platform, || format!("spawn {shown}"))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like [`capture`](Self::capture), but a non-zero exit is a
    /// [`Platform`](ErrorKind::Platform) error carrying the captured output.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        let captured = self.capture(program, args, cancel).await?;
        if !captured.success {
            let code = captured
                .code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let detail = match captured.combined() {
                s if s.is_empty() => "no output".to_string(),
                s => s,
            };
            return Err(Error::wrap(
                ErrorKind::Platform,
                format!("{} exited with code {code}", display_command(program, args)),
                detail,
            ));
        }
        Ok(captured)
    }

    /// [`run`](Self::run) returning trimmed stdout.
    pub async fn stdout(
        &self,
        program: &str,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String> {
        Ok(self.run(program, args, cancel).await?.stdout.trim().to_string())
    }
}

fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
