//! Action trait, closure adapter, and the built-in shell action.

use apmake_tools::Command;
use apmake_types::{ApmakeError, Params, Result};

// ---------------------------------------------------------------------------
// Action trait
// ---------------------------------------------------------------------------

/// A unit of work attached to a rule.
///
/// When the owning rule fires, the action is invoked with the parameters it
/// was registered with. Returning an error aborts the rest of the run.
pub trait Action: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    fn execute(&self, params: &Params) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FnAction: closure adapter
// ---------------------------------------------------------------------------

pub struct FnAction<F> {
    name: String,
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&Params) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&Params) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, params: &Params) -> Result<()> {
        (self.func)(params)
    }
}

// ---------------------------------------------------------------------------
// ShellAction: runs the `command` parameter
// ---------------------------------------------------------------------------

/// Runs an external command taken from the `command` parameter.
///
/// `command` is either a string, tokenized with shell quoting rules, or an
/// array of argument strings. With `check` (default `true`) a non-zero exit
/// fails the rule; with `check = false` the exit status is only logged.
pub struct ShellAction;

impl ShellAction {
    fn argv(params: &Params) -> Result<Vec<String>> {
        let invalid = |message: &str| ApmakeError::InvalidParam {
            action: "shell".into(),
            key: "command".into(),
            message: message.into(),
        };

        match params.get("command") {
            Some(serde_json::Value::String(line)) => apmake_tools::split(line),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(String::from)
                        .ok_or_else(|| invalid("arguments must be strings"))
                })
                .collect(),
            Some(_) => Err(invalid("expected a string or an array of strings")),
            None => Err(invalid("command is required")),
        }
    }
}

impl Action for ShellAction {
    fn name(&self) -> &str {
        "shell"
    }

    fn execute(&self, params: &Params) -> Result<()> {
        let argv = Self::argv(params)?;
        let check = params.get_bool("check").unwrap_or(true);

        let cmd = Command::from_args(argv)?;
        if check {
            cmd.check()?;
        } else if !cmd.success() {
            tracing::warn!(command = %cmd, code = ?cmd.code(), "Command failed (unchecked)");
        }
        Ok(())
    }
}
