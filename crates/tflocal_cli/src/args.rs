//! Classification of the wrapped tool's command line.
//!
//! The wrapper never interprets most arguments; it only needs to know the
//! subcommand, the global `-chdir` option, and whether the user asked for
//! a version or help.

use std::path::{Path, PathBuf};

/// Subcommands that never read provider or backend configuration.
pub const PASSTHROUGH_COMMANDS: &[&str] =
    &["version", "fmt", "help", "login", "logout", "metadata"];

/// Flags that print usage and exit.
pub const HELP_FLAGS: &[&str] = &["-help", "--help", "-h"];

/// Flags that print the tool's version.
pub const VERSION_FLAGS: &[&str] = &["--version", "-version", "-v"];

/// Subcommands a dry run may start unchanged. Everything else is either
/// rewritten to `plan` or not started at all.
pub const READ_ONLY_COMMANDS: &[&str] =
    &["init", "validate", "show", "output", "providers", "graph"];

/// `workspace` subcommands that only read.
const READ_ONLY_WORKSPACE_COMMANDS: &[&str] = &["list", "show"];

/// Options that may take their value as the next argument.
const VALUE_OPTIONS: &[&str] = &[
    "-var",
    "-var-file",
    "-target",
    "-replace",
    "-out",
    "-state",
    "-state-out",
    "-backup",
    "-lock-timeout",
    "-parallelism",
];

const CHDIR_PREFIX: &str = "-chdir=";
const AUTO_APPROVE: &str = "-auto-approve";
const NO_INPUT: &str = "-input=false";
const NO_LOCK: &str = "-lock=false";

/// What a dry run does with the requested command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryRunPlan {
    /// Run the tool with these arguments instead.
    Invoke(Vec<String>),
    /// Do not run the tool at all.
    Stop { command: String },
}

impl DryRunPlan {
    fn stop(command: impl Into<String>) -> Self {
        DryRunPlan::Stop {
            command: command.into(),
        }
    }
}

/// A parsed wrapped-tool command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolArgs {
    raw: Vec<String>,
    chdir: Option<PathBuf>,
    command_index: Option<usize>,
}

impl ToolArgs {
    pub fn parse(raw: Vec<String>) -> Self {
        let mut chdir = None;
        let mut command_index = None;

        for (index, arg) in raw.iter().enumerate() {
            if let Some(dir) = arg.strip_prefix(CHDIR_PREFIX) {
                chdir = Some(PathBuf::from(dir));
            } else if !arg.starts_with('-') {
                command_index = Some(index);
                break;
            }
        }

        Self {
            raw,
            chdir,
            command_index,
        }
    }

    pub fn raw(&self) -> &[String] {
        &self.raw
    }

    /// The subcommand, if one was given.
    pub fn command(&self) -> Option<&str> {
        self.command_index.map(|i| self.raw[i].as_str())
    }

    pub fn chdir(&self) -> Option<&Path> {
        self.chdir.as_deref()
    }

    /// Options between the global options and the end of the line.
    fn command_args(&self) -> &[String] {
        match self.command_index {
            Some(i) => &self.raw[i + 1..],
            None => &[],
        }
    }

    fn global_args(&self) -> &[String] {
        match self.command_index {
            Some(i) => &self.raw[..i],
            None => &self.raw,
        }
    }

    /// Whether the tool will read the module configuration.
    pub fn needs_override(&self) -> bool {
        if self.raw.iter().any(|arg| HELP_FLAGS.contains(&arg.as_str())) {
            return false;
        }
        if self.is_version_request() {
            return false;
        }
        match self.command() {
            Some(command) => !PASSTHROUGH_COMMANDS.contains(&command),
            None => false,
        }
    }

    /// Whether the wrapper should print its own version banner first.
    pub fn is_version_request(&self) -> bool {
        self.command() == Some("version")
            || self
                .global_args()
                .iter()
                .any(|arg| VERSION_FLAGS.contains(&arg.as_str()))
    }

    /// Whether the subcommand was given `name`, bare or as `name=value`.
    pub fn has_option(&self, name: &str) -> bool {
        has_option(self.command_args(), name)
    }

    /// The directory the tool will treat as the root module.
    pub fn module_dir(&self, cwd: &Path) -> PathBuf {
        match &self.chdir {
            Some(dir) => cwd.join(dir),
            None => cwd.to_path_buf(),
        }
    }

    /// Rewrite the command so that it cannot change any state.
    pub fn dry_run_plan(&self) -> DryRunPlan {
        let Some(command) = self.command() else {
            return DryRunPlan::Invoke(self.raw.clone());
        };

        let substitute: &[&str] = match command {
            "apply" => &["plan"],
            "destroy" => &["plan", "-destroy"],
            "plan" => &["plan"],
            "workspace" => {
                return match self.positional().next() {
                    Some(sub) if !READ_ONLY_WORKSPACE_COMMANDS.contains(&sub) => {
                        DryRunPlan::stop(format!("workspace {sub}"))
                    }
                    _ => DryRunPlan::Invoke(self.raw.clone()),
                };
            }
            _ if READ_ONLY_COMMANDS.contains(&command) => {
                return DryRunPlan::Invoke(self.raw.clone());
            }
            _ => return DryRunPlan::stop(command),
        };

        let options: Vec<&String> = self
            .command_args()
            .iter()
            .filter(|arg| !is_auto_approve(arg))
            .collect();
        // `apply <planfile>` has nothing to plan.
        if command == "apply" && has_positional(&options) {
            return DryRunPlan::stop(command);
        }

        let mut args: Vec<String> = self.global_args().to_vec();
        args.extend(substitute.iter().map(|s| s.to_string()));
        args.extend(options.into_iter().cloned());
        if !has_option(&args, "-lock") {
            args.push(NO_LOCK.to_string());
        }
        if !has_option(&args, "-input") {
            args.push(NO_INPUT.to_string());
        }
        DryRunPlan::Invoke(args)
    }

    /// Non-option arguments after the subcommand.
    fn positional(&self) -> impl Iterator<Item = &str> {
        self.command_args()
            .iter()
            .map(String::as_str)
            .filter(|arg| !arg.starts_with('-'))
    }
}

fn has_positional(options: &[&String]) -> bool {
    let mut value_expected = false;
    for arg in options {
        if arg.starts_with('-') {
            value_expected = VALUE_OPTIONS.contains(&arg.as_str());
        } else if value_expected {
            value_expected = false;
        } else {
            return true;
        }
    }
    false
}

/// Whether `name` was given, either bare or as `name=value`.
fn has_option(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| {
        arg.strip_prefix(name)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('='))
    })
}

fn is_auto_approve(arg: &str) -> bool {
    arg == AUTO_APPROVE || arg.starts_with("-auto-approve=")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> ToolArgs {
        ToolArgs::parse(line.split_whitespace().map(str::to_string).collect())
    }

    fn invoked(line: &str) -> Vec<String> {
        match args(line).dry_run_plan() {
            DryRunPlan::Invoke(args) => args,
            other => panic!("expected invocation for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_command_and_chdir() {
        let parsed = args("-chdir=infra/dev apply -auto-approve");
        assert_eq!(parsed.command(), Some("apply"));
        assert_eq!(parsed.chdir(), Some(Path::new("infra/dev")));
        assert_eq!(
            parsed.module_dir(Path::new("/work")),
            PathBuf::from("/work/infra/dev")
        );
        assert_eq!(args("").command(), None);
    }

    #[test]
    fn test_needs_override() {
        let needs = [
            "init",
            "plan -out=tf.plan",
            "apply",
            "-chdir=x destroy",
            "output",
            "import a b",
        ];
        for line in needs {
            assert!(args(line).needs_override(), "{line}");
        }
        let passthrough = [
            "",
            "version",
            "fmt -recursive",
            "-help",
            "plan -h",
            "--version",
            "-v",
            "login",
            "metadata functions",
        ];
        for line in passthrough {
            assert!(!args(line).needs_override(), "{line}");
        }
    }

    #[test]
    fn test_version_request() {
        assert!(args("version").is_version_request());
        assert!(args("--version").is_version_request());
        assert!(args("-v").is_version_request());
        assert!(args("-chdir=x -version").is_version_request());
        assert!(!args("plan -var=v=1").is_version_request());
    }

    #[test]
    fn test_dry_run_substitution() {
        assert_eq!(
            invoked("apply -auto-approve"),
            vec!["plan", "-lock=false", "-input=false"]
        );
        assert_eq!(
            invoked("-chdir=infra destroy -auto-approve -var=a=b"),
            vec![
                "-chdir=infra",
                "plan",
                "-destroy",
                "-var=a=b",
                "-lock=false",
                "-input=false"
            ]
        );
        assert_eq!(
            invoked("plan -input=true"),
            vec!["plan", "-input=true", "-lock=false"]
        );
        assert_eq!(
            invoked("apply -auto-approve=true -lock=false"),
            vec!["plan", "-lock=false", "-input=false"]
        );
        assert_eq!(
            invoked("plan -lock-timeout=5s"),
            vec!["plan", "-lock-timeout=5s", "-lock=false", "-input=false"]
        );
        assert_eq!(
            invoked("apply -var region=eu-west-1"),
            vec!["plan", "-var", "region=eu-west-1", "-lock=false", "-input=false"]
        );
    }

    #[test]
    fn test_dry_run_runs_read_only_commands_unchanged() {
        let read_only = [
            "init -upgrade",
            "validate",
            "show -json",
            "output vpc_id",
            "providers",
            "graph",
            "workspace list",
            "workspace show",
        ];
        for line in read_only {
            let expected: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            assert_eq!(invoked(line), expected);
        }
    }

    #[test]
    fn test_dry_run_stops_state_changing_commands() {
        let stopped = [
            ("import aws_s3_bucket.b b", "import"),
            ("state rm aws_s3_bucket.b", "state"),
            ("taint x", "taint"),
            ("refresh", "refresh"),
            ("apply tf.plan", "apply"),
            ("force-unlock 1234", "force-unlock"),
            ("workspace new dev", "workspace new"),
            ("workspace delete dev", "workspace delete"),
            ("workspace select -or-create dev", "workspace select"),
            ("console", "console"),
            ("test", "test"),
        ];
        for (line, command) in stopped {
            assert_eq!(
                args(line).dry_run_plan(),
                DryRunPlan::Stop {
                    command: command.to_string()
                },
                "{line}"
            );
        }
    }
}
