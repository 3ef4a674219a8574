//! tflocal - Terraform wrapper for a local AWS emulator.
//!
//! Exit codes:
//! - The wrapped tool's own exit code whenever it ran
//! - 0: Dry run stopped before a state-changing command
//! - 1: The wrapper failed before the tool could run

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tflocal_cli::{Cli, RunController};
use tflocal_core::Settings;
use tflocal_runner::ProcessRunner;

/// Exit codes owned by the wrapper itself
pub struct ExitCodes;

impl ExitCodes {
    pub const WRAPPER_ERROR: u8 = 1;
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they never mix with the tool's stdout.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tflocal=warn")))
        .try_init();

    let args = Cli::parse().tool_args();

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("tflocal: {:#}", e);
            ExitCode::from(ExitCodes::WRAPPER_ERROR)
        }
    }
}

async fn run(args: tflocal_cli::ToolArgs) -> anyhow::Result<u8> {
    let settings = Settings::from_env().context("invalid configuration")?;
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let runner = Arc::new(ProcessRunner::new());
    let controller =
        RunController::new(settings, runner, cwd).interactive(std::io::stdin().is_terminal());

    if let Some(banner) = RunController::version_banner(&args) {
        println!("{}", banner);
    }
    let outcome = controller.run(&args).await?;
    Ok(u8::try_from(outcome.exit_code).unwrap_or(ExitCodes::WRAPPER_ERROR))
}
