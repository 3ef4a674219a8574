//! Mock tool runner for testing.
//!
//! Provides a configurable mock implementation of the ToolRunner trait
//! for use in tests without a real `terraform` binary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::{CommandConfig, RunConfig, StdinMode};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ExecutionResult, ToolRunner};

/// Predefined mock response for a command.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub stdin: Option<StdinMode>,
    pub capture_output: bool,
}

/// Called with each command before the mock answers it, while the
/// caller's files are still in place.
pub type RunHook = Arc<dyn Fn(&CommandConfig) + Send + Sync>;

/// Mock tool runner for testing.
///
/// This runner captures all calls and returns predefined responses in
/// order, cycling when it runs out.
#[derive(Clone)]
pub struct MockRunner {
    /// When false, every run fails as if the program were not installed.
    available: Arc<RwLock<bool>>,
    /// Predefined responses for run calls.
    responses: Arc<RwLock<Vec<MockResponse>>>,
    /// Index of next response to return.
    response_index: Arc<AtomicUsize>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Simulated failure to return (as a string message for ExecutionFailed).
    simulate_failure: Arc<RwLock<Option<String>>>,
    hook: Arc<RwLock<Option<RunHook>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            available: Arc::new(RwLock::new(true)),
            responses: Arc::new(RwLock::new(Vec::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
            hook: Arc::new(RwLock::new(None)),
        }
    }

    /// Set whether the program can be found.
    pub fn set_available(self, available: bool) -> Self {
        *self.available.write() = available;
        self
    }

    /// Add a mock response for the next run call.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Set multiple responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Set a failure to simulate.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Inspect each command as it is run.
    pub fn on_run(self, hook: impl Fn(&CommandConfig) + Send + Sync + 'static) -> Self {
        *self.hook.write() = Some(Arc::new(hook));
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.method == method)
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn next_response(&self) -> MockResponse {
        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }

    fn check_failure(&self) -> RunnerResult<()> {
        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }
        Ok(())
    }
}

#[async_trait]
impl ToolRunner for MockRunner {
    async fn run(
        &self,
        command: &CommandConfig,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        self.record_call(CapturedCall {
            method: "run".to_string(),
            program: command.program.clone(),
            args: command.args.clone(),
            workdir: command.workdir.clone(),
            stdin: Some(run_config.stdin.clone()),
            capture_output: run_config.capture_output,
        });

        self.check_failure()?;
        if !*self.available.read() {
            return Err(RunnerError::ProgramNotFound(command.program.clone()));
        }
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(command);
        }

        let response = self.next_response();
        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_basic() {
        let runner = MockRunner::new().add_response(MockResponse::success("Terraform v1.6.2"));

        let command = CommandConfig::new("terraform").arg("version");
        let result = runner.run(&command, &RunConfig::capture()).await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "Terraform v1.6.2");
    }

    #[tokio::test]
    async fn test_mock_runner_captures_calls() {
        let runner = MockRunner::new();

        let command = CommandConfig::new("tofu")
            .args(["plan", "-input=false"])
            .workdir("/work");
        let _ = runner
            .run(&command, &RunConfig::interactive().stdin(StdinMode::Null))
            .await;

        let calls = runner.get_method_calls("run");
        assert_eq!(calls.len(), 1);

        let call = &calls[0];
        assert_eq!(call.program, "tofu");
        assert_eq!(call.args, vec!["plan", "-input=false"]);
        assert_eq!(call.workdir, Some(PathBuf::from("/work")));
        assert_eq!(call.stdin, Some(StdinMode::Null));
        assert!(!call.capture_output);
    }

    #[tokio::test]
    async fn test_mock_runner_failure_simulation() {
        let runner = MockRunner::new().simulate_failure("simulated error");

        let result = runner
            .run(&CommandConfig::new("terraform"), &RunConfig::default())
            .await;
        assert!(matches!(result, Err(RunnerError::ExecutionFailed(_))));
    }

    #[tokio::test]
    async fn test_mock_runner_multiple_responses() {
        let runner = MockRunner::new().with_responses(vec![
            MockResponse::success("first"),
            MockResponse::failure(1, "second failed"),
        ]);
        let command = CommandConfig::new("terraform");

        let r1 = runner.run(&command, &RunConfig::default()).await.unwrap();
        assert_eq!(r1.stdout, "first");

        let r2 = runner.run(&command, &RunConfig::default()).await.unwrap();
        assert_eq!(r2.exit_code, 1);
        assert_eq!(r2.stderr, "second failed");

        let r3 = runner.run(&command, &RunConfig::default()).await.unwrap();
        assert_eq!(r3.stdout, "first");
    }

    #[tokio::test]
    async fn test_mock_runner_hook_sees_command() {
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = seen.clone();
        let runner = MockRunner::new().on_run(move |command| sink.write().push(command.display()));

        runner
            .run(&CommandConfig::new("terraform").arg("init"), &RunConfig::default())
            .await
            .unwrap();
        assert_eq!(*seen.read(), vec!["terraform init".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_runner_availability() {
        let unavailable_runner = MockRunner::new().set_available(false);
        let err = unavailable_runner
            .run(&CommandConfig::new("terraform"), &RunConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ProgramNotFound(_)));
    }
}
