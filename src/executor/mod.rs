//! Process execution for the remote-session runner.
//!
//! [`CommandExecutor`] is the seam between building `ssh` invocations and
//! running them: [`RealCommandExecutor`] spawns processes and streams their
//! output to the log, while tests substitute a recorder.

mod pipe;
mod real;

use std::process::ExitStatus;

use anyhow::Result;

pub use real::RealCommandExecutor;

/// Joins arguments as debug-quoted strings for log and error messages.
pub(crate) fn format_command_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A command, its arguments and optional standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name, resolved through PATH.
    pub command: String,
    pub args: Vec<String>,
    /// Bytes written to the child's stdin, which is closed afterwards.
    /// `None` connects stdin to `/dev/null`.
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            stdin: None,
        }
    }

    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Outcome of running a command.
#[derive(Debug)]
pub struct ExecutionResult {
    /// `None` when the command was not run (dry run).
    pub status: Option<ExitStatus>,
}

impl ExecutionResult {
    /// True on a zero exit status, and always in dry-run mode.
    pub fn success(&self) -> bool {
        self.status.is_none_or(|s| s.success())
    }

    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Runs commands described by a [`CommandSpec`].
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_args_quotes_each_argument() {
        let args = vec!["-p".to_string(), "bash -c 'true'".to_string()];
        assert_eq!(format_command_args(&args), "\"-p\" \"bash -c 'true'\"");
    }

    #[test]
    fn with_stdin_keeps_args() {
        let spec = CommandSpec::new("ssh", vec!["host".to_string()]).with_stdin("echo hi\n");
        assert_eq!(spec.args, vec!["host"]);
        assert_eq!(spec.stdin.as_deref(), Some(b"echo hi\n".as_slice()));
        assert_eq!(CommandSpec::new("true", Vec::new()).stdin, None);
    }

    #[test]
    fn dry_run_result_is_success() {
        let result = ExecutionResult { status: None };
        assert!(result.success());
        assert_eq!(result.code(), None);
    }
}
