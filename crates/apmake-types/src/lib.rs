//! Shared types and errors for the apmake rule runner.
//!
//! This crate provides the foundational types used across all other apmake crates:
//! - `ApmakeError`: unified error taxonomy
//! - `Params`: named parameters bound to an action at registration time

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unified error type for all apmake subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ApmakeError {
    // === Registry Errors ===
    #[error("Cannot merge rule for '{incoming}' into rule for '{existing}'")]
    TargetMismatch { existing: String, incoming: String },

    #[error("No rules registered")]
    NoTargets,

    // === Execution Errors ===
    #[error("Action '{action}' failed on target '{target}': {message}")]
    ActionFailed {
        target: String,
        action: String,
        message: String,
    },

    #[error("Invalid parameter '{key}' for action '{action}': {message}")]
    InvalidParam {
        action: String,
        key: String,
        message: String,
    },

    // === Command Errors ===
    #[error("Invalid command `{command}`: {message}")]
    InvalidCommand { command: String, message: String },

    #[error("Command `{command}` exited with {}", describe_exit(.code))]
    CommandFailed { command: String, code: Option<i32> },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ApmakeError {
    /// Returns `true` if the error was raised while firing a rule rather than
    /// while registering or resolving.
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            ApmakeError::ActionFailed { .. }
                | ApmakeError::CommandFailed { .. }
                | ApmakeError::InvalidParam { .. }
        )
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// A convenience alias for `Result<T, ApmakeError>`.
pub type Result<T> = std::result::Result<T, ApmakeError>;

// ---------------------------------------------------------------------------
// Params: named action parameters
// ---------------------------------------------------------------------------

/// Named parameters an action is invoked with.
///
/// Parameters are fixed when the action is registered; every time the owning
/// rule fires, the action receives exactly this map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, serde_json::Value>,
}

impl Params {
    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    /// Convenience accessor that returns a `String`. Falls back to `default`
    /// when the key is absent or not a JSON string.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_str(key)
            .map(String::from)
            .unwrap_or_else(|| default.to_owned())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
