//! Subprocess execution for the runtime and its tooling.
//!
//! Output is streamed line by line into `tracing` while it is collected, so
//! long pip installs show up in the log as they happen.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or None if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` to completion.
    ///
    /// `label` tags the log lines produced by the child.
    async fn run(
        &self,
        label: &str,
        program: &Path,
        args: &[OsString],
    ) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] spawning real processes via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        label: &str,
        program: &Path,
        args: &[OsString],
    ) -> std::io::Result<CommandOutput> {
        debug!("Running {}: {} {:?}", label, program.display(), args);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr) = tokio::join!(
            collect_lines(stdout, label, false),
            collect_lines(stderr, label, true)
        );
        let status = child.wait().await?;

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Drains `reader` to EOF.
///
/// Lines are decoded lossily; child output in a legacy code page must not
/// stop the drain, or the child dies on its next write to a closed pipe.
async fn collect_lines<R>(reader: Option<R>, label: &str, is_stderr: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut collected = String::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("{}: failed to read output: {}", label, e);
                break;
            }
        }

        let raw = String::from_utf8_lossy(&buf);
        let line = raw.trim_end_matches(['\n', '\r']);
        if is_stderr {
            warn!("{} stderr: {}", label, line);
        } else {
            debug!("{} stdout: {}", label, line);
        }
        collected.push_str(line);
        collected.push('\n');
    }
    collected
}

/// Outcome of one advisory step (bootstrap, a single library install).
///
/// Failures here are recorded rather than raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl StepOutcome {
    pub fn succeeded(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            detail: detail.into(),
        }
    }

    /// Builds an outcome from a finished command.
    pub fn from_output(name: impl Into<String>, output: &CommandOutput) -> Self {
        if output.success() {
            Self::succeeded(name, "exit code 0")
        } else {
            let stderr = output.stderr.trim();
            let detail = match output.code {
                Some(code) if stderr.is_empty() => format!("exit code {}", code),
                Some(code) => format!("exit code {}: {}", code, stderr),
                None => "terminated by signal".to_string(),
            };
            Self::failed(name, detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_outcome_from_output() {
        let ok = CommandOutput {
            code: Some(0),
            ..Default::default()
        };
        assert!(StepOutcome::from_output("numpy", &ok).ok);

        let failed = CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "ERROR: No matching distribution\n".to_string(),
        };
        let outcome = StepOutcome::from_output("scipy", &failed);
        assert!(!outcome.ok);
        assert_eq!(outcome.name, "scipy");
        assert_eq!(outcome.detail, "exit code 1: ERROR: No matching distribution");

        let killed = CommandOutput::default();
        assert_eq!(
            StepOutcome::from_output("pip", &killed).detail,
            "terminated by signal"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_collects_output() {
        let output = TokioCommandRunner
            .run(
                "sh",
                Path::new("/bin/sh"),
                &[
                    OsString::from("-c"),
                    OsString::from("echo out; echo err 1>&2; exit 3"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_survives_invalid_utf8() {
        // Writes after the bad line fail with a broken pipe unless stdout is drained.
        let script = "printf 'caf\\351\\n'; \
                      i=0; while [ $i -lt 3000 ]; do echo line $i || exit 42; i=$((i+1)); done; \
                      printf 'd\\377j\\340 vu\\n' 1>&2; exit 0";
        let output = TokioCommandRunner
            .run(
                "sh",
                Path::new("/bin/sh"),
                &[OsString::from("-c"), OsString::from(script)],
            )
            .await
            .unwrap();

        assert_eq!(output.code, Some(0));
        let mut lines = output.stdout.lines();
        assert_eq!(lines.next(), Some("caf\u{FFFD}"));
        assert_eq!(output.stdout.lines().count(), 3001);
        assert!(output.stdout.ends_with("line 2999\n"));
        assert_eq!(output.stderr, "d\u{FFFD}j\u{FFFD} vu\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_keeps_unterminated_last_line() {
        let output = TokioCommandRunner
            .run(
                "sh",
                Path::new("/bin/sh"),
                &[OsString::from("-c"), OsString::from("printf 'done'")],
            )
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_tokio_runner_missing_program() {
        let result = TokioCommandRunner
            .run("missing", Path::new("/definitely/not/a/program"), &[])
            .await;
        assert!(result.is_err());
    }
}
