//! The run controller.
//!
//! One run moves through `Scan -> Resolve -> Synthesize -> Write`, then
//! either stops (`DryStop`) or hands the terminal to the wrapped tool
//! (`Invoke`), and ends in `Done`. Scan and version failures abort before
//! any file is written or the tool is started.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use tflocal_core::{
    ConfigScanner, CredentialResolver, OverrideDocument, OverrideSynthesizer, Settings, ToolVersion,
};
use tflocal_runner::{CommandConfig, RunConfig, StdinMode, ToolRunner};

use crate::args::{DryRunPlan, ToolArgs};

/// Answer to `init`'s "copy existing state to the new backend?" prompt.
pub const MIGRATE_STATE_ANSWER: &str = "yes\n";

/// Stages of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Scan,
    Resolve,
    Synthesize,
    Write,
    DryStop,
    Invoke,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Scan => "scan",
            RunState::Resolve => "resolve",
            RunState::Synthesize => "synthesize",
            RunState::Write => "write",
            RunState::DryStop => "dry-stop",
            RunState::Invoke => "invoke",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The wrapped tool's exit code, or 0 when it was not started.
    pub exit_code: i32,
    /// Override files written during the run. Already removed again unless
    /// the run was a dry run.
    pub override_files: Vec<PathBuf>,
    /// `DryStop` when the tool was never started, `Done` otherwise.
    pub stopped_at: RunState,
    /// The tool's version, when it was probed.
    pub version: Option<ToolVersion>,
}

/// Drives one wrapped-tool invocation.
pub struct RunController {
    settings: Settings,
    runner: Arc<dyn ToolRunner>,
    cwd: PathBuf,
    interactive: bool,
}

impl RunController {
    pub fn new(settings: Settings, runner: Arc<dyn ToolRunner>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            runner,
            cwd: cwd.into(),
            interactive: true,
        }
    }

    /// Whether a person can answer the tool's prompts. When nobody can,
    /// prompts caused by the override are answered up front.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Banner printed ahead of the tool's own version output.
    pub fn version_banner(args: &ToolArgs) -> Option<String> {
        args.is_version_request()
            .then(|| format!("tflocal v{}", env!("CARGO_PKG_VERSION")))
    }

    pub async fn run(&self, args: &ToolArgs) -> Result<RunOutcome> {
        if !args.needs_override() {
            debug!("No override needed for {:?}", args.command());
            let exit_code = self.invoke(args.raw().to_vec(), StdinMode::Inherit).await?;
            return Ok(RunOutcome {
                exit_code,
                override_files: Vec::new(),
                stopped_at: RunState::Done,
                version: None,
            });
        }

        let module_dir = args.module_dir(&self.cwd);
        let version = self.probe_version(&module_dir).await?;
        info!(
            "{} {} uses the {} endpoint schema",
            self.settings.tf_cmd,
            version.terraform,
            version.schema()
        );

        let dirs = self.module_dirs(&module_dir);
        self.enter(RunState::Scan);
        let mut scans = Vec::with_capacity(dirs.len());
        for dir in &dirs {
            let scan = ConfigScanner::scan(dir)
                .with_context(|| format!("failed to read the configuration in {}", dir.display()))?;
            scans.push(scan);
        }

        self.enter(RunState::Resolve);
        let credentials = CredentialResolver::new(&self.settings);

        self.enter(RunState::Synthesize);
        let synthesizer = OverrideSynthesizer::new(&self.settings, &version, &credentials);
        let documents: Vec<OverrideDocument> =
            scans.iter().map(|scan| synthesizer.synthesize(scan)).collect();

        self.enter(RunState::Write);
        let mut override_files = Vec::with_capacity(dirs.len());
        for (dir, document) in dirs.iter().zip(&documents) {
            match document.write_to(dir) {
                Ok(path) => override_files.push(path),
                Err(e) => {
                    remove_files(&override_files);
                    return Err(e).with_context(|| {
                        format!("failed to write the override file in {}", dir.display())
                    });
                }
            }
        }

        if self.settings.dry_run {
            return self.dry_run(args, override_files, version).await;
        }

        self.enter(RunState::Invoke);
        let backend_redirected = documents.iter().any(|doc| doc.backend.is_some());
        let stdin = self.invoke_stdin(args, backend_redirected);
        let result = self.invoke(args.raw().to_vec(), stdin).await;
        remove_files(&override_files);
        let exit_code = result?;

        self.enter(RunState::Done);
        Ok(RunOutcome {
            exit_code,
            override_files,
            stopped_at: RunState::Done,
            version: Some(version),
        })
    }

    async fn dry_run(
        &self,
        args: &ToolArgs,
        override_files: Vec<PathBuf>,
        version: ToolVersion,
    ) -> Result<RunOutcome> {
        for path in &override_files {
            info!("Dry run: override file left at {}", path.display());
        }

        match args.dry_run_plan() {
            DryRunPlan::Stop { command } => {
                self.enter(RunState::DryStop);
                warn!("Dry run: not running `{}`", command);
                Ok(RunOutcome {
                    exit_code: 0,
                    override_files,
                    stopped_at: RunState::DryStop,
                    version: Some(version),
                })
            }
            DryRunPlan::Invoke(substituted) => {
                self.enter(RunState::Invoke);
                if substituted != args.raw() {
                    info!("Dry run: running `{}` instead", substituted.join(" "));
                }
                let exit_code = self.invoke(substituted, StdinMode::Null).await?;
                self.enter(RunState::Done);
                Ok(RunOutcome {
                    exit_code,
                    override_files,
                    stopped_at: RunState::Done,
                    version: Some(version),
                })
            }
        }
    }

    /// Redirecting the backend makes `init` offer to migrate existing state.
    /// Without a terminal that prompt would wait forever, so it is answered
    /// in advance unless the user already decided how `init` should behave.
    fn invoke_stdin(&self, args: &ToolArgs, backend_redirected: bool) -> StdinMode {
        let decided = ["-input", "-force-copy", "-reconfigure", "-migrate-state"]
            .iter()
            .any(|option| args.has_option(option));
        if !self.interactive && backend_redirected && args.command() == Some("init") && !decided {
            debug!("Answering the state migration prompt in advance");
            return StdinMode::Script(MIGRATE_STATE_ANSWER.to_string());
        }
        StdinMode::Inherit
    }

    async fn probe_version(&self, module_dir: &Path) -> Result<ToolVersion> {
        let command = CommandConfig::new(&self.settings.tf_cmd)
            .args(["version", "-json"])
            .workdir(self.workdir_for(module_dir));
        let result = self
            .runner
            .run(&command, &RunConfig::capture())
            .await
            .with_context(|| format!("failed to run `{}`", command.display()))?;

        if !result.success() {
            bail!(
                "`{}` exited with code {}: {}",
                command.display(),
                result.exit_code,
                result.stderr.trim()
            );
        }
        ToolVersion::parse(&result.stdout)
            .with_context(|| format!("could not determine the {} version", self.settings.tf_cmd))
    }

    async fn invoke(&self, args: Vec<String>, stdin: StdinMode) -> Result<i32> {
        let command = CommandConfig::new(&self.settings.tf_cmd)
            .args(args)
            .workdir(&self.cwd);
        let result = self
            .runner
            .run(&command, &RunConfig::interactive().stdin(stdin))
            .await
            .with_context(|| format!("failed to run `{}`", command.display()))?;
        Ok(result.exit_code)
    }

    fn module_dirs(&self, module_dir: &Path) -> Vec<PathBuf> {
        let mut dirs = vec![module_dir.to_path_buf()];
        for location in &self.settings.additional_locations {
            let dir = self.cwd.join(location);
            if dirs.contains(&dir) {
                continue;
            }
            if !dir.is_dir() {
                warn!("Additional override location {} is not a directory", dir.display());
                continue;
            }
            dirs.push(dir);
        }
        dirs
    }

    /// The probe runs where the lock file is, so provider selections match.
    fn workdir_for(&self, module_dir: &Path) -> PathBuf {
        if module_dir.is_dir() {
            module_dir.to_path_buf()
        } else {
            self.cwd.clone()
        }
    }

    fn enter(&self, state: RunState) {
        debug!(state = %state, "Run state");
    }
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}
