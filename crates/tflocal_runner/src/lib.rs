//! # tflocal_runner
//!
//! Subprocess execution for the tflocal wrapper.
//!
//! The wrapped tool is always reached through the [`ToolRunner`] trait, so
//! the wrapper can be exercised against [`MockRunner`] without a real
//! `terraform` binary.
//!
//! # Features
//!
//! - **Process Runner**: `tokio::process` based, interactive or captured
//! - **Scripted Input**: answers written to the child's stdin up front
//! - **Exit Codes**: signal deaths reported as `128 + signal`
//! - **Mock Runner**: For testing without the wrapped tool installed
//!
//! # Example
//!
//! ```rust,no_run
//! use tflocal_runner::{CommandConfig, ProcessRunner, RunConfig, ToolRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::default();
//!     let command = CommandConfig::new("terraform").args(["version", "-json"]);
//!
//!     let result = runner.run(&command, &RunConfig::capture()).await?;
//!     println!("{}", result.stdout);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use config::{CommandConfig, RunConfig, StdinMode};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner, RunHook};
pub use process::ProcessRunner;
pub use runner::{ExecutionResult, ToolRunner};
