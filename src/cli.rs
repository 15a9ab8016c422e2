//! CLI argument parsing and task input validation.

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::core::safety::is_unsafe;

/// Minimum task description length after trimming.
pub const MIN_TASK_LENGTH: usize = 5;

/// `taskwright` - plan, validate, and execute shell tasks with
/// feedback-driven retries.
#[derive(Parser, Debug)]
#[command(name = "taskwright", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan and execute a task described in natural language.
    Run {
        /// Task description; multiple words are joined with spaces.
        #[arg(required = true)]
        task: Vec<String>,
        /// Enable verbose logging and the feedback log file.
        #[arg(long)]
        debug: bool,
        /// Override the session attempt budget.
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
    },
    /// List the available plan generation backends.
    Providers,
}

/// Rejections of the task text itself, before any provider call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskValidationError {
    /// The description is too short to plan for.
    #[error("task description is too short (minimum {MIN_TASK_LENGTH} characters)")]
    TooShort,
    /// The description itself asks for a destructive operation.
    #[error("this task appears to request a destructive operation")]
    Destructive,
}

/// Validates and normalizes a raw task description.
///
/// # Errors
///
/// Returns [`TaskValidationError`] for descriptions that are too short or
/// that themselves match the safety denylist.
pub fn validate_task(raw: &str) -> Result<String, TaskValidationError> {
    let task = raw.trim();
    if task.chars().count() < MIN_TASK_LENGTH {
        return Err(TaskValidationError::TooShort);
    }
    if is_unsafe(task) {
        return Err(TaskValidationError::Destructive);
    }
    Ok(task.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Tests that the CLI definition is internally consistent.
    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    /// Tests parsing a run command with flags.
    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::parse_from([
            "taskwright",
            "run",
            "--debug",
            "--max-retries",
            "5",
            "create",
            "a",
            "readme",
        ]);

        let Command::Run {
            task,
            debug,
            max_retries,
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(task.join(" "), "create a readme");
        assert!(debug);
        assert_eq!(max_retries, Some(5));
    }

    /// Tests parsing the providers command.
    #[test]
    fn parses_providers() {
        let cli = Cli::parse_from(["taskwright", "providers"]);

        assert!(matches!(cli.command, Command::Providers));
    }

    /// Tests that a reasonable task passes validation trimmed.
    #[test]
    fn accepts_reasonable_task() {
        assert_eq!(
            validate_task("  create a readme  "),
            Ok("create a readme".to_string())
        );
    }

    /// Tests rejection of too-short tasks.
    #[test]
    fn rejects_short_task() {
        assert_eq!(validate_task("ls"), Err(TaskValidationError::TooShort));
        assert_eq!(validate_task("    "), Err(TaskValidationError::TooShort));
    }

    /// Tests rejection of tasks that are themselves destructive.
    #[test]
    fn rejects_destructive_task() {
        assert_eq!(
            validate_task("please rm -rf / for me"),
            Err(TaskValidationError::Destructive)
        );
        assert_eq!(
            validate_task("format c: and reinstall"),
            Err(TaskValidationError::Destructive)
        );
    }
}
