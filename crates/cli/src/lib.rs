//! Command-line host for the refguard deletion guard.
//!
//! - [`app`] - command-line arguments.
//! - [`config`] - environment-driven settings.
//! - [`confirm`] - terminal and fixed-policy answers to the cleanup question.
//! - [`drain`] - the tick loop that runs deferred saves and closes.
//! - [`commands`] - `scan`, `delete` and `import` over a filesystem store.

pub mod app;
pub mod commands;
pub mod config;
pub mod confirm;
pub mod drain;
pub mod trace;
