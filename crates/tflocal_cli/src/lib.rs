//! Library side of the `tflocal` binary.
//!
//! `tflocal` accepts exactly the wrapped tool's command line. Before any
//! command that reads the module configuration it writes an override file
//! pointing the AWS provider, the S3 backend and S3 remote state at a local
//! emulator, then runs the tool and relays its exit code.

use clap::Parser;

pub mod args;
pub mod controller;

pub use args::{DryRunPlan, ToolArgs};
pub use controller::{RunController, RunOutcome, RunState, MIGRATE_STATE_ANSWER};

/// Terraform wrapper for a local AWS emulator
#[derive(Parser, Debug)]
#[command(name = "tflocal")]
#[command(about = "Run Terraform against a local AWS emulator")]
#[command(long_about = r#"
Runs the wrapped tool with an extra override file that redirects every AWS
provider, the S3 backend and S3 remote state to a local emulator. All
arguments are passed to the wrapped tool unchanged.

ENVIRONMENT:
  TF_CMD                 Wrapped binary (default: terraform)
  AWS_ENDPOINT_URL       Emulator URL (default: http://localhost:4566)
  S3_HOSTNAME            Host for virtual-hosted S3 addressing
  CUSTOMIZE_ACCESS_KEY   Honour AWS_ACCESS_KEY_ID
  DRY_RUN                Write the override file without changing state
  SKIP_ALIASES           Provider aliases to leave untouched

EXIT CODES:
  The wrapped tool's exit code, or 1 when the wrapper itself failed.
"#)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Arguments for the wrapped tool
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn tool_args(self) -> ToolArgs {
        ToolArgs::parse(self.args)
    }
}
