//! Runner that spawns the wrapped tool as a child process.

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{CommandConfig, RunConfig, StdinMode};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ExecutionResult, ToolRunner};

/// Spawns commands with `tokio::process`.
///
/// Interactive runs share the wrapper's terminal. While such a child is
/// running, interrupts are left to the child so the wrapper survives to
/// clean up after it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build(&self, command: &CommandConfig, run_config: &RunConfig) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.workdir {
            cmd.current_dir(dir);
        }

        cmd.stdin(match run_config.stdin {
            StdinMode::Inherit => Stdio::inherit(),
            StdinMode::Null => Stdio::null(),
            StdinMode::Script(_) => Stdio::piped(),
        });
        if run_config.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        command: &CommandConfig,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        info!("Running: {}", command.display());
        if let Some(dir) = &command.workdir {
            debug!("Working directory: {:?}", dir);
        }

        let started_at = Utc::now();
        let mut child = self
            .build(command, run_config)
            .spawn()
            .map_err(|e| spawn_error(&command.program, e))?;

        // Fed concurrently with draining stdout/stderr.
        let feeder = match (&run_config.stdin, child.stdin.take()) {
            (StdinMode::Script(input), Some(mut stdin)) => {
                let input = input.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = stdin.write_all(input.as_bytes()).await {
                        debug!("Child closed stdin early: {}", e);
                    }
                }))
            }
            _ => None,
        };

        let interrupts = (!run_config.capture_output).then(|| {
            tokio::spawn(async {
                while tokio::signal::ctrl_c().await.is_ok() {
                    debug!("Interrupt received; waiting for the child to exit");
                }
            })
        });

        let output = child.wait_with_output().await;
        if let Some(handle) = interrupts {
            handle.abort();
        }
        if let Some(handle) = feeder {
            let _ = handle.await;
        }
        let output = output?;

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let exit_code = exit_code(output.status);
        if exit_code == 0 {
            debug!("{} completed in {}ms", command.program, duration_ms);
        } else {
            warn!(
                "{} exited with code {} after {}ms",
                command.program, exit_code, duration_ms
            );
        }

        Ok(ExecutionResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            started_at,
            finished_at,
            duration_ms,
        })
    }
}

fn spawn_error(program: &str, source: std::io::Error) -> RunnerError {
    if source.kind() == ErrorKind::NotFound {
        RunnerError::ProgramNotFound(program.to_string())
    } else {
        RunnerError::SpawnFailed {
            program: program.to_string(),
            source,
        }
    }
}

/// Exit code as a shell would report it.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let runner = ProcessRunner::default();
        let command = CommandConfig::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);

        let result = runner.run(&command, &RunConfig::capture()).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_scripted_stdin() {
        let runner = ProcessRunner::default();
        let command = CommandConfig::new("sh").args(["-c", "read answer; echo got:$answer"]);
        let run_config = RunConfig::capture().script("yes\n");

        let result = runner.run(&command, &run_config).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "got:yes");
    }

    #[tokio::test]
    async fn test_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::default();
        let command = CommandConfig::new("sh").args(["-c", "pwd"]).workdir(dir.path());

        let result = runner.run(&command, &RunConfig::capture()).await.unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(result.stdout.trim()).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner = ProcessRunner::default();
        let command = CommandConfig::new("tflocal-definitely-not-installed");

        let err = runner.run(&command, &RunConfig::capture()).await.unwrap_err();
        assert!(matches!(err, RunnerError::ProgramNotFound(_)));
    }
}
