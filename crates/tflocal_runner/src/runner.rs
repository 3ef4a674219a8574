//! Tool runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CommandConfig, RunConfig};
use crate::error::RunnerResult;

/// Result of running the wrapped tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code, `128 + signal` when the child was killed by a signal
    pub exit_code: i32,
    /// Captured stdout; empty when output was not captured
    pub stdout: String,
    /// Captured stderr; empty when output was not captured
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the wrapped infrastructure tool.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run a command to completion. A non-zero exit code is not an error;
    /// errors mean the command could not be run.
    async fn run(&self, command: &CommandConfig, run_config: &RunConfig)
        -> RunnerResult<ExecutionResult>;
}
