//! `taskwright` - natural-language tasks to validated shell plans.
//!
//! Turns a task description into a plan of shell commands and file writes,
//! validates it against a safety denylist, executes it, and refines it with
//! user feedback until success, cancellation, or an exhausted attempt budget.

pub mod cli;
pub mod config;
pub mod core;
pub mod feedback;
pub mod interaction;
pub mod logging;
pub mod provider;
