//! `taskwright` entry point.

use anyhow::{Context, Result, bail};
use clap::Parser;

use taskwright::cli::{Cli, Command, validate_task};
use taskwright::config::Config;
use taskwright::core::{ExecutionContext, SessionOptions, SessionOutcome, run_session};
use taskwright::interaction::{Console, Interaction};
use taskwright::logging;
use taskwright::provider::{Backend, make_generator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Providers => {
            list_providers();
            Ok(())
        }
        Command::Run {
            task,
            debug,
            max_retries,
        } => run_task(&task.join(" "), debug, max_retries).await,
    }
}

fn list_providers() {
    for backend in Backend::all() {
        println!("{:<14} {}", backend.name(), backend.description());
    }
}

async fn run_task(raw_task: &str, debug: bool, max_retries: Option<u32>) -> Result<()> {
    let mut config = Config::from_env().context("Failed to load configuration")?;
    config.apply_cli(debug, max_retries);
    logging::init(config.debug);

    let task = validate_task(raw_task)?;
    let generator =
        make_generator(&config).context("Failed to construct the plan generator")?;
    let cwd = std::env::current_dir().context("Failed to resolve the working directory")?;
    let mut ctx = ExecutionContext::new(cwd).with_timeout(config.command_timeout);
    let mut console = Console;
    let options = SessionOptions {
        max_attempts: config.max_retries,
        record_feedback: config.debug,
        ..SessionOptions::default()
    };

    match run_session(
        &task,
        generator.as_ref(),
        &mut console,
        &mut ctx,
        &options,
    )
    .await
    {
        SessionOutcome::Completed { .. } => {
            console.show("Task completed.");
            Ok(())
        }
        SessionOutcome::Cancelled => {
            console.show("Task cancelled.");
            Ok(())
        }
        SessionOutcome::Exhausted { last_output } => {
            if !last_output.is_empty() {
                console.show(&last_output);
            }
            bail!("Giving up after {} attempts", config.max_retries)
        }
    }
}
