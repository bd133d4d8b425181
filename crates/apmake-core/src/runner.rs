//! The rule registry and executor.
//!
//! Registration builds the rule table; [`Runner::run`] resolves a plan for one
//! target and fires the planned rules one after another.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use apmake_types::{ApmakeError, Result};

use crate::resolve::{self, Mode, Plan};
use crate::rule::Rule;
use crate::staleness::{Filesystem, LocalFilesystem, StatCache};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Registry of rules keyed by target, plus the filesystem used for staleness.
pub struct Runner {
    rules: HashMap<String, Rule>,
    /// Targets in the order they were first referenced.
    order: Vec<String>,
    fs: Box<dyn Filesystem>,
}

/// Options for a single run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Reserved. Rules always run sequentially.
    pub parallel: bool,
    /// Resolve and report without firing any rule.
    pub dry_run: bool,
}

/// What a run resolved and executed.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: String,
    pub mode: Mode,
    pub plan: Vec<String>,
    pub executed: Vec<String>,
    pub actions_run: usize,
    /// The entry target was already up to date and did not fire.
    pub skipped_entry: bool,
    pub dry_run: bool,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

impl Runner {
    /// An empty registry resolving targets against the working directory.
    pub fn new() -> Self {
        Self::with_filesystem(LocalFilesystem::current_dir())
    }

    pub fn with_filesystem(fs: impl Filesystem + 'static) -> Self {
        Self {
            rules: HashMap::new(),
            order: Vec::new(),
            fs: Box::new(fs),
        }
    }

    pub fn rule(&self, target: &str) -> Option<&Rule> {
        self.rules.get(target)
    }

    /// Get the rule for `target`, creating an empty one on first reference.
    pub fn rule_mut(&mut self, target: &str) -> &mut Rule {
        if !self.rules.contains_key(target) {
            self.order.push(target.to_string());
        }
        self.rules
            .entry(target.to_string())
            .or_insert_with(|| Rule::new(target))
    }

    /// Known targets, in the order they were first referenced.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// The first registered target.
    pub fn default_target(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Register a rule and return the resulting entry for further configuration.
    ///
    /// A rule for a new target, or any rule when `overrule` is set, is installed
    /// as is. Otherwise it is merged into the existing rule: dependencies are
    /// unioned and its actions run after the ones already registered.
    pub fn register(&mut self, mut rule: Rule, overrule: bool) -> &mut Rule {
        let target = rule.target.clone();
        let new_deps: Vec<String> = rule.dependencies.iter().cloned().collect();

        let previous = self
            .rules
            .get(&target)
            .map(|r| (r.derivatives.clone(), r.dependencies.clone()));

        match previous {
            Some(_) if !overrule => {
                tracing::debug!(rule = %target, "Merging into existing rule");
                self.rule_mut(&target).absorb(rule);
            }
            Some((derivatives, old_deps)) => {
                tracing::debug!(rule = %target, "Overruling existing rule");
                // dependents of the old rule still depend on this target
                rule.derivatives.extend(derivatives);
                for dep in old_deps.difference(&rule.dependencies) {
                    if let Some(dep_rule) = self.rules.get_mut(dep) {
                        dep_rule.derivatives.remove(&target);
                    }
                }
                *self.rule_mut(&target) = rule;
            }
            None => {
                tracing::debug!(rule = %target, deps = new_deps.len(), "Registering rule");
                *self.rule_mut(&target) = rule;
            }
        }

        for dep in &new_deps {
            self.rule_mut(dep).derivatives.insert(target.clone());
        }

        self.rule_mut(&target)
    }

    /// Shorthand for `register(rule, false)`.
    pub fn register_rule(&mut self, rule: Rule) -> &mut Rule {
        self.register(rule, false)
    }

    fn resolve(&self, target: &str, stats: &mut StatCache<'_>) -> Plan {
        let recursive = self.rules.get(target).is_some_and(Rule::is_recursive);
        if recursive {
            resolve::recursive(&self.rules, target, stats)
        } else {
            resolve::bounded(&self.rules, target, stats)
        }
    }

    /// Resolve the ordered list of targets that must run for `target`.
    pub fn plan(&self, target: &str) -> Plan {
        let mut stats = StatCache::new(self.fs.as_ref());
        self.resolve(target, &mut stats)
    }

    /// Resolve `target` (or the first registered target) and fire every
    /// planned rule in order.
    ///
    /// The entry target is skipped when nothing else is planned and its file
    /// is at least as new as all of its dependencies. The first failing
    /// action aborts the run; rules that already fired are not undone.
    pub fn run(&self, target: Option<&str>, options: &RunOptions) -> Result<RunReport> {
        let started = Instant::now();
        let target = match target {
            Some(t) => t,
            None => self.default_target().ok_or(ApmakeError::NoTargets)?,
        };

        if options.parallel {
            tracing::warn!("Parallel execution is not supported, running sequentially");
        }

        let mut stats = StatCache::new(self.fs.as_ref());
        let plan = self.resolve(target, &mut stats);
        let deps = self
            .rules
            .get(target)
            .map(|r| r.dependencies.iter().map(String::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        let skipped_entry = plan.is_entry_only() && stats.is_up_to_date(target, deps);

        tracing::info!(rule = %target, mode = ?plan.mode, plan = ?plan.order, "Resolved plan");

        let mut executed = Vec::new();
        let mut actions_run = 0;

        if options.dry_run {
            tracing::info!(rule = %target, "Dry run, not executing");
        } else if skipped_entry {
            tracing::info!(rule = %target, "Up to date");
        } else {
            for name in &plan.order {
                match self.rules.get(name) {
                    Some(rule) => actions_run += rule.fire()?,
                    None => tracing::debug!(rule = %name, "No rule registered, nothing to do"),
                }
                executed.push(name.clone());
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(rule = %target, executed = executed.len(), actions_run, duration_ms, "Run finished");

        Ok(RunReport {
            target: target.to_string(),
            mode: plan.mode,
            plan: plan.order,
            executed,
            actions_run,
            skipped_entry,
            dry_run: options.dry_run,
            duration_ms,
        })
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staleness::MemoryFilesystem;
    use apmake_types::Params;
    use std::sync::{Arc, Mutex};

    fn runner_with(entries: &[(&str, u64)]) -> (Runner, Arc<MemoryFilesystem>) {
        let fs = Arc::new(MemoryFilesystem::new());
        for (name, secs) in entries {
            fs.touch(name, *secs);
        }
        (Runner::with_filesystem(fs.clone()), fs)
    }

    fn logging(log: &Arc<Mutex<Vec<String>>>, target: &str) -> Rule {
        let log = log.clone();
        let name = target.to_string();
        Rule::new(target).call(move |_: &Params| {
            log.lock().unwrap().push(name.clone());
            Ok(())
        })
    }

    #[test]
    fn repeated_registration_merges_dependencies() {
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(Rule::new("build").requires(["a"]));
        let rule = runner.register_rule(Rule::new("build").requires(["b"]));

        let deps: Vec<_> = rule.dependencies().iter().map(String::as_str).collect();
        assert_eq!(deps, vec!["a", "b"]);
        assert_eq!(runner.targets().filter(|t| *t == "build").count(), 1);
    }

    #[test]
    fn registration_records_derivatives_and_stubs() {
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(Rule::new("deps").requires(["hello", "compound"]));
        runner.register_rule(Rule::new("deep").requires(["deps"]));

        let hello = runner.rule("hello").unwrap();
        assert!(hello.derivatives().contains("deps"));
        assert!(hello.actions().is_empty());
        assert!(runner.rule("deps").unwrap().derivatives().contains("deep"));
        assert_eq!(
            runner.targets().collect::<Vec<_>>(),
            vec!["deps", "compound", "hello", "deep"]
        );
        assert_eq!(runner.default_target(), Some("deps"));
    }

    #[test]
    fn merged_dependencies_get_derivative_edges() {
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(Rule::new("build").requires(["a"]));
        runner.register_rule(Rule::new("build").requires(["b"]));
        assert!(runner.rule("b").unwrap().derivatives().contains("build"));
    }

    #[test]
    fn overrule_replaces_rule_and_keeps_dependents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(logging(&log, "lib").requires(["old.c"]));
        runner.register_rule(Rule::new("app").requires(["lib"]));

        let rule = runner.register(logging(&log, "lib").requires(["new.c"]), true);
        assert_eq!(rule.actions().len(), 1);
        assert!(rule.dependencies().contains("new.c"));
        assert!(!rule.dependencies().contains("old.c"));
        assert!(rule.derivatives().contains("app"));

        assert!(!runner.rule("old.c").unwrap().derivatives().contains("lib"));
        assert!(runner.rule("new.c").unwrap().derivatives().contains("lib"));
    }

    #[test]
    fn register_returns_rule_for_chaining() {
        let (mut runner, _) = runner_with(&[]);
        runner
            .register_rule(Rule::new("verydeep").requires(["deep"]))
            .set_recursive(true);
        assert!(runner.rule("verydeep").unwrap().is_recursive());
    }

    #[test]
    fn run_without_rules_fails() {
        let (runner, _) = runner_with(&[]);
        let err = runner.run(None, &RunOptions::default()).unwrap_err();
        assert!(matches!(err, ApmakeError::NoTargets));
    }

    #[test]
    fn run_defaults_to_first_registered_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(logging(&log, "hello"));
        runner.register_rule(logging(&log, "other"));

        let report = runner.run(None, &RunOptions::default()).unwrap();
        assert_eq!(report.target, "hello");
        assert_eq!(*log.lock().unwrap(), vec!["hello"]);
    }

    #[test]
    fn run_fires_dependencies_before_dependents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(logging(&log, "hello"));
        runner.register_rule(logging(&log, "compound"));
        runner.register_rule(logging(&log, "deps").requires(["hello", "compound"]));
        runner.register_rule(logging(&log, "deep").requires(["deps"]));

        let report = runner.run(Some("deep"), &RunOptions::default()).unwrap();
        assert_eq!(report.mode, Mode::Bounded);
        assert_eq!(*log.lock().unwrap(), vec!["compound", "hello", "deps", "deep"]);
        assert_eq!(report.executed, report.plan);
        assert_eq!(report.actions_run, 4);
    }

    #[test]
    fn up_to_date_target_runs_nothing_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut runner, _) = runner_with(&[("out", 10), ("in", 5)]);
        runner.register_rule(logging(&log, "in"));
        runner.register_rule(logging(&log, "out").requires(["in"]));

        for _ in 0..2 {
            let report = runner.run(Some("out"), &RunOptions::default()).unwrap();
            assert_eq!(report.plan, vec!["out"]);
            assert!(report.skipped_entry);
            assert!(report.executed.is_empty());
        }

        runner.rule_mut("out").set_recursive(true);
        for _ in 0..2 {
            let report = runner.run(Some("out"), &RunOptions::default()).unwrap();
            assert_eq!(report.mode, Mode::Recursive);
            assert_eq!(report.actions_run, 0);
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn touching_a_dependency_rebuilds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut runner, fs) = runner_with(&[("out", 10), ("in", 5)]);
        runner.register_rule(logging(&log, "out").requires(["in"]));

        fs.touch("in", 20);
        let report = runner.run(Some("out"), &RunOptions::default()).unwrap();
        assert_eq!(report.plan, vec!["in", "out"]);
        assert_eq!(*log.lock().unwrap(), vec!["out"]);
        assert_eq!(report.executed, vec!["in", "out"]);
    }

    #[test]
    fn missing_entry_always_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut runner, _) = runner_with(&[("in", 5)]);
        runner.register_rule(logging(&log, "out").requires(["in"]));

        runner.run(Some("out"), &RunOptions::default()).unwrap();
        runner.run(Some("out"), &RunOptions::default()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["out", "out"]);
    }

    #[test]
    fn dry_run_executes_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(logging(&log, "out"));

        let options = RunOptions {
            dry_run: true,
            parallel: true,
        };
        let report = runner.run(Some("out"), &options).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.plan, vec!["out"]);
        assert!(report.executed.is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_action_aborts_remaining_rules() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(logging(&log, "a"));
        runner.register_rule(
            Rule::new("b")
                .requires(["a"])
                .call(|_| Err(ApmakeError::Other("compile error".into()))),
        );
        runner.register_rule(logging(&log, "c").requires(["b"]));

        let err = runner.run(Some("c"), &RunOptions::default()).unwrap_err();
        match err {
            ApmakeError::ActionFailed { target, message, .. } => {
                assert_eq!(target, "b");
                assert_eq!(message, "compile error");
            }
            other => panic!("Expected ActionFailed, got: {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn report_serializes_mode_in_snake_case() {
        let (mut runner, _) = runner_with(&[]);
        runner.register_rule(Rule::new("x").recursive());
        let report = runner.run(Some("x"), &RunOptions::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "recursive");
        assert_eq!(json["plan"], serde_json::json!(["x"]));
    }
}
