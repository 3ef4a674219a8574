//! Command and run configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A command line for the wrapped tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program name or path
    pub program: String,
    /// Arguments, passed through unchanged
    pub args: Vec<String>,
    /// Working directory; the wrapper's own when unset
    pub workdir: Option<PathBuf>,
}

impl CommandConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// The command as it would be typed in a shell, for logging.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where the child's standard input comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StdinMode {
    /// The wrapper's own terminal or pipe.
    #[default]
    Inherit,
    /// Closed immediately, so any prompt fails instead of blocking.
    Null,
    /// Written in full as soon as the child starts, then closed.
    Script(String),
}

/// How a command is run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Capture stdout and stderr instead of sharing the wrapper's streams
    pub capture_output: bool,
    pub stdin: StdinMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

impl RunConfig {
    /// Hand the terminal to the child.
    pub fn interactive() -> Self {
        Self {
            capture_output: false,
            stdin: StdinMode::Inherit,
        }
    }

    /// Collect output for the wrapper to inspect.
    pub fn capture() -> Self {
        Self {
            capture_output: true,
            stdin: StdinMode::Null,
        }
    }

    pub fn stdin(mut self, stdin: StdinMode) -> Self {
        self.stdin = stdin;
        self
    }

    /// Feed scripted answers to the child's prompts.
    pub fn script(self, input: impl Into<String>) -> Self {
        self.stdin(StdinMode::Script(input.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let command = CommandConfig::new("terraform")
            .arg("-chdir=infra")
            .args(["plan", "-input=false"])
            .workdir("/tmp/module");

        assert_eq!(command.args, vec!["-chdir=infra", "plan", "-input=false"]);
        assert_eq!(command.workdir, Some(PathBuf::from("/tmp/module")));
        assert_eq!(command.display(), "terraform -chdir=infra plan -input=false");
    }

    #[test]
    fn test_run_config_presets() {
        assert_eq!(RunConfig::default(), RunConfig::interactive());
        assert!(RunConfig::capture().capture_output);
        assert_eq!(RunConfig::capture().stdin, StdinMode::Null);
        assert_eq!(
            RunConfig::interactive().script("yes\n").stdin,
            StdinMode::Script("yes\n".to_string())
        );
    }
}
