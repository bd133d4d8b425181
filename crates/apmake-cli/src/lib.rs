//! Assembly boundary for apmake programs.
//!
//! Holds the single process-wide [`Runner`], registration helpers that write
//! into it, and the command-line entry point that runs one target from it.
//! A program registers its rules first, then calls [`run_cli`] once.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use anyhow::Context as _;
use clap::Parser;

use apmake_core::{Params, Result, RunOptions, RunReport, Rule, Runner};

#[derive(Parser, Debug)]
#[command(name = "apmake", version, about = "Run registered rules whose targets are out of date")]
pub struct Cli {
    /// Target to run (default: the first registered target)
    pub target: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Change to this directory before resolving targets
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,

    /// Print what would run without running it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Reserved; rules always run sequentially
    #[arg(short = 'j', long)]
    pub parallel: bool,

    /// List registered targets and exit
    #[arg(short, long)]
    pub list: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Process-wide runner
// ---------------------------------------------------------------------------

static RUNNER: OnceLock<Mutex<Runner>> = OnceLock::new();

/// Lock the process-wide runner.
///
/// The lock is held for the whole run, so actions must not call back into it.
pub fn runner() -> MutexGuard<'static, Runner> {
    RUNNER
        .get_or_init(|| Mutex::new(Runner::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Register `action` for `target`, after any actions already registered for it.
pub fn rule<F>(target: &str, requires: &[&str], action: F)
where
    F: Fn(&Params) -> Result<()> + Send + Sync + 'static,
{
    rule_with(target, requires, Params::new(), action);
}

/// Like [`rule`], invoking `action` with `params` every time the rule fires.
pub fn rule_with<F>(target: &str, requires: &[&str], params: Params, action: F)
where
    F: Fn(&Params) -> Result<()> + Send + Sync + 'static,
{
    let rule = Rule::new(target)
        .requires(requires.iter().copied())
        .action_with(apmake_core::FnAction::new(target, action), params);
    runner().register(rule, false);
}

/// Replace whatever was registered for `target`.
pub fn overrule<F>(target: &str, requires: &[&str], action: F)
where
    F: Fn(&Params) -> Result<()> + Send + Sync + 'static,
{
    let rule = Rule::new(target)
        .requires(requires.iter().copied())
        .call(action);
    runner().register(rule, true);
}

/// Check the whole dependency closure when `target` is run.
pub fn recurse(target: &str) {
    runner().rule_mut(target).set_recursive(true);
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Parse the command line, set up logging, and run the selected target.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    execute(&cli)
}

/// Run the process-wide runner as described by `cli`.
pub fn execute(cli: &Cli) -> anyhow::Result<()> {
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("cannot change to directory {}", dir.display()))?;
        tracing::debug!(directory = %dir.display(), "Changed working directory");
    }

    let runner = runner();

    if cli.list {
        print!("{}", list_targets(&runner));
        return Ok(());
    }

    let options = RunOptions {
        parallel: cli.parallel,
        dry_run: cli.dry_run,
    };
    let report = runner.run(cli.target.as_deref(), &options)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if cli.dry_run {
        print!("{}", describe_plan(&report));
    }
    Ok(())
}

fn list_targets(runner: &Runner) -> String {
    let mut out = String::new();
    for target in runner.targets() {
        let Some(rule) = runner.rule(target) else {
            continue;
        };
        if rule.actions().is_empty() && rule.dependencies().is_empty() {
            continue;
        }
        let deps: Vec<&str> = rule.dependencies().iter().map(String::as_str).collect();
        let mode = if rule.is_recursive() { " (recursive)" } else { "" };
        out.push_str(&format!("{target}{mode}: {}\n", deps.join(" ")));
    }
    out
}

fn describe_plan(report: &RunReport) -> String {
    let mut out = String::new();
    for target in &report.plan {
        if report.skipped_entry && *target == report.target {
            out.push_str(&format!("{target} (up to date)\n"));
        } else {
            out.push_str(&format!("{target}\n"));
        }
    }
    out
}
