//! Process and environment collaborators for apmake rule actions.
//!
//! The rule engine never inspects a command's output; actions use [`Command`]
//! to run programs and compose their boolean success, and [`Env`] to read and
//! modify the environment inherited by those programs.

pub mod command;
pub mod env;

pub use command::{quote, split, Command};
pub use env::{Env, ENV};
