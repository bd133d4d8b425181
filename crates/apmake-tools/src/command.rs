//! Synchronous external command execution.

use std::fmt;
use std::process::ExitStatus;

use apmake_types::{ApmakeError, Result};

/// Split a command line into arguments using POSIX shell quoting rules.
pub fn split(command: &str) -> Result<Vec<String>> {
    let argv = shlex::split(command).ok_or_else(|| ApmakeError::InvalidCommand {
        command: command.to_string(),
        message: "unbalanced quotes or trailing escape".into(),
    })?;
    if argv.is_empty() {
        return Err(ApmakeError::InvalidCommand {
            command: command.to_string(),
            message: "command is empty".into(),
        });
    }
    Ok(argv)
}

/// Re-quote an argument list so it can be pasted back into a shell.
pub fn quote<S: AsRef<str>>(argv: &[S]) -> String {
    shlex::try_join(argv.iter().map(|s| s.as_ref())).unwrap_or_else(|_| {
        argv.iter()
            .map(|s| s.as_ref())
            .collect::<Vec<&str>>()
            .join(" ")
    })
}

/// A command that has been run to completion.
///
/// Construction runs the program with inherited stdio and waits for it. A
/// non-zero exit is not an error: check [`success`](Command::success) and
/// chain with `&&` to stop after the first failure.
#[derive(Debug, Clone)]
pub struct Command {
    argv: Vec<String>,
    status: ExitStatus,
}

impl Command {
    /// Tokenize `command` like a shell would and run it.
    pub fn run(command: &str) -> Result<Self> {
        Self::from_args(split(command)?)
    }

    /// Run an already tokenized argument list.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = args.into_iter().map(Into::into).collect();
        let (program, rest) = argv.split_first().ok_or_else(|| ApmakeError::InvalidCommand {
            command: String::new(),
            message: "command is empty".into(),
        })?;

        tracing::info!(command = %quote(&argv), "Running command");

        let status = std::process::Command::new(program).args(rest).status()?;

        tracing::debug!(command = %quote(&argv), code = ?status.code(), "Command finished");

        Ok(Self { argv, status })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn status(&self) -> ExitStatus {
        self.status
    }

    /// Exit code, or `None` if the process was terminated by a signal.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// `true` when the command exited with status zero.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Turn a failed run into [`ApmakeError::CommandFailed`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(ApmakeError::CommandFailed {
                command: self.to_string(),
                code: self.code(),
            })
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.argv))
    }
}
