//! Rule registry, staleness checks, and dependency resolution.
//!
//! This crate implements the core apmake runner: rules and their actions,
//! modification-time comparison between targets, bounded and recursive
//! resolution of outdated targets, and sequential execution of the resulting
//! plan.

pub mod action;
pub mod resolve;
pub mod rule;
pub mod runner;
pub mod staleness;

pub use action::{Action, FnAction, ShellAction};
pub use resolve::{Mode, Plan};
pub use rule::{ActionEntry, Rule};
pub use runner::{RunOptions, RunReport, Runner};
pub use staleness::{Comparison, Filesystem, LocalFilesystem, MemoryFilesystem, StatCache};

pub use apmake_types::{ApmakeError, Params, Result};
