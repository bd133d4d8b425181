//! Rules: a target, its dependencies, and the actions that produce it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use apmake_types::{ApmakeError, Params, Result};

use crate::action::{Action, FnAction};

/// An action together with the parameters it was registered with.
#[derive(Clone)]
pub struct ActionEntry {
    pub action: Arc<dyn Action>,
    pub params: Params,
}

impl fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEntry")
            .field("action", &self.action.name())
            .field("params", &self.params)
            .finish()
    }
}

/// The registered definition of how to produce a target.
///
/// `derivatives` (targets that depend on this one) are maintained by the
/// [`Runner`](crate::Runner) on registration and cannot be set directly.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) target: String,
    pub(crate) dependencies: BTreeSet<String>,
    pub(crate) derivatives: BTreeSet<String>,
    pub(crate) actions: Vec<ActionEntry>,
    pub(crate) recursive: bool,
}

impl Rule {
    /// An empty rule: no dependencies, no actions, bounded resolution.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            dependencies: BTreeSet::new(),
            derivatives: BTreeSet::new(),
            actions: Vec::new(),
            recursive: false,
        }
    }

    /// Add dependencies. Duplicates collapse.
    pub fn requires<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Append an action invoked with no parameters.
    pub fn action(self, action: impl Action + 'static) -> Self {
        self.action_with(action, Params::new())
    }

    /// Append an action invoked with `params`.
    pub fn action_with(mut self, action: impl Action + 'static, params: Params) -> Self {
        self.actions.push(ActionEntry {
            action: Arc::new(action),
            params,
        });
        self
    }

    /// Append a closure as an action named after the target.
    pub fn call<F>(self, func: F) -> Self
    where
        F: Fn(&Params) -> Result<()> + Send + Sync + 'static,
    {
        let name = self.target.clone();
        self.action(FnAction::new(name, func))
    }

    /// Use recursive resolution when this rule is the entry point of a run.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn set_recursive(&mut self, recursive: bool) -> &mut Self {
        self.recursive = recursive;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn derivatives(&self) -> &BTreeSet<String> {
        &self.derivatives
    }

    pub fn actions(&self) -> &[ActionEntry] {
        &self.actions
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Merge `other` into this rule.
    ///
    /// Dependency and derivative sets are unioned and `other`'s actions run
    /// after this rule's. Fails with [`ApmakeError::TargetMismatch`] when the
    /// rules are for different targets.
    pub fn merge(&mut self, other: Rule) -> Result<()> {
        if self.target != other.target {
            return Err(ApmakeError::TargetMismatch {
                existing: self.target.clone(),
                incoming: other.target,
            });
        }
        self.absorb(other);
        Ok(())
    }

    /// Like [`merge`](Rule::merge), but leaves both inputs untouched.
    pub fn merged(&self, other: &Rule) -> Result<Rule> {
        let mut combined = self.clone();
        combined.merge(other.clone())?;
        Ok(combined)
    }

    /// Merge without the target check; callers guarantee the targets match.
    pub(crate) fn absorb(&mut self, other: Rule) {
        self.dependencies.extend(other.dependencies);
        self.derivatives.extend(other.derivatives);
        self.actions.extend(other.actions);
        self.recursive |= other.recursive;
    }

    /// Run every action in registration order. Returns the number of actions run.
    pub fn fire(&self) -> Result<usize> {
        for entry in &self.actions {
            let name = entry.action.name();
            tracing::info!(rule = %self.target, action = name, "Running action");
            entry
                .action
                .execute(&entry.params)
                .map_err(|e| ApmakeError::ActionFailed {
                    target: self.target.clone(),
                    action: name.to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(self.actions.len())
    }
}
