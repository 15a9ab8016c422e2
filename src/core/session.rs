//! The retry-feedback session state machine.
//!
//! One session drives a task from description to completion: ask the
//! provider for a plan, let the user approve it, execute it, confirm the
//! result actually satisfied the task, and on failure or dissatisfaction
//! collect feedback and refine, bounded by the attempt budget. The loop is
//! explicit and bounded rather than recursive, so the attempt-count invariant
//! is visible in one place and cancellation is a plain return.
//!
//! An *attempt* is one generate→validate→execute cycle, including the first.
//! A generation that errors or yields an empty plan still consumes an
//! attempt; execution is just skipped for it.

use std::fmt::Write;

use tracing::{debug, info, warn};

use crate::core::executor::ExecutionContext;
use crate::core::runner::{ExecutionPolicy, execute_plan};
use crate::feedback::log_feedback;
use crate::interaction::Interaction;
use crate::provider::PlanGenerator;

/// Phases of a retry session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Requesting the initial plan.
    #[default]
    Init,
    /// Requesting a refined plan from previous attempt plus feedback.
    Refining,
    /// Plan in hand; approval and execution.
    Executing,
    /// Last attempt failed, was declined, or left the user dissatisfied;
    /// waiting on feedback.
    NeedsFeedback,
    /// Terminal: an attempt succeeded and the user confirmed the result.
    Completed,
    /// Terminal: the user ended the session.
    Cancelled,
    /// Terminal: the attempt budget ran out.
    Exhausted,
}

impl SessionPhase {
    /// Returns true if the session is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Exhausted)
    }
}

/// How a session ended.
///
/// `Exhausted` is deliberately distinct from a failed final attempt: the
/// caller can tell "gave up after N tries" apart from "the last try failed"
/// by the variant, with the last output attached either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// An attempt succeeded.
    Completed {
        /// Combined output of the successful attempt.
        output: String,
    },
    /// The user declined to continue.
    Cancelled,
    /// The attempt budget ran out without success.
    Exhausted {
        /// Combined output of the last executed attempt, if any.
        last_output: String,
    },
}

/// Options for running a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Attempt budget, first attempt included.
    pub max_attempts: u32,
    /// Success policy handed to the runner.
    pub policy: ExecutionPolicy,
    /// Append collected feedback to the debug log file.
    pub record_feedback: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            policy: ExecutionPolicy::default(),
            record_feedback: false,
        }
    }
}

/// Mutable state of one retry session.
///
/// Owned by [`run_session`], mutated once per iteration, dropped when the
/// loop exits.
#[derive(Debug, Clone)]
pub struct RetrySession {
    /// The task description, fixed for the session.
    pub task: String,
    /// The most recent plan from the provider.
    pub current_plan: Vec<String>,
    /// Combined output of the last executed attempt.
    pub last_output: String,
    /// Cumulative feedback, chained across attempts.
    pub feedback: Option<String>,
    /// Attempts consumed so far.
    pub attempt_count: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Current phase.
    pub phase: SessionPhase,
}

impl RetrySession {
    /// Creates a fresh session for a task.
    #[must_use]
    pub fn new(task: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            task: task.into(),
            current_plan: Vec::new(),
            last_output: String::new(),
            feedback: None,
            attempt_count: 0,
            max_attempts,
            phase: SessionPhase::Init,
        }
    }

    /// Consumes an attempt if the budget allows; returns false once spent.
    fn start_attempt(&mut self) -> bool {
        if self.attempt_count >= self.max_attempts {
            return false;
        }
        self.attempt_count += 1;
        true
    }

    /// Returns true if another attempt could still start.
    #[must_use]
    pub const fn has_attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Chains new feedback onto what earlier attempts collected.
    fn chain_feedback(&mut self, new: &str) {
        self.feedback = Some(match self.feedback.take() {
            Some(old) => format!("{old}; {new}"),
            None => new.to_string(),
        });
    }
}

/// Runs a full retry session for a task.
///
/// Never returns an error: generation failures are consumed as attempts and
/// looped, execution failures and user-rejected results become feedback
/// rounds, and the caller gets a terminal [`SessionOutcome`].
pub async fn run_session(
    task: &str,
    generator: &dyn PlanGenerator,
    interaction: &mut dyn Interaction,
    ctx: &mut ExecutionContext,
    options: &SessionOptions,
) -> SessionOutcome {
    let mut session = RetrySession::new(task, options.max_attempts);

    loop {
        if !session.start_attempt() {
            session.phase = SessionPhase::Exhausted;
            info!(
                attempts = session.attempt_count,
                "attempt budget exhausted"
            );
            return SessionOutcome::Exhausted {
                last_output: session.last_output,
            };
        }

        session.phase = if session.attempt_count == 1 {
            SessionPhase::Init
        } else {
            SessionPhase::Refining
        };
        debug!(
            attempt = session.attempt_count,
            max = session.max_attempts,
            "requesting plan"
        );

        let previous = if session.current_plan.is_empty() {
            None
        } else {
            Some(session.current_plan.as_slice())
        };
        let plan = match generator
            .generate_plan(&session.task, previous, session.feedback.as_deref())
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                // Treated as "no plan produced": the attempt is spent but
                // nothing executes.
                warn!(error = %e, "plan generation failed");
                interaction.show(&format!("Plan generation failed: {e}"));
                continue;
            }
        };
        if plan.is_empty() {
            interaction.show("The provider returned no plan for this task.");
            continue;
        }
        session.current_plan = plan;

        session.phase = SessionPhase::Executing;
        interaction.show(&render_plan(&session.current_plan));
        if !interaction.confirm("Execute this plan?") {
            if !interaction.confirm("Try again with different feedback?") {
                session.phase = SessionPhase::Cancelled;
                info!(attempt = session.attempt_count, "session cancelled");
                return SessionOutcome::Cancelled;
            }
            session.phase = SessionPhase::NeedsFeedback;
            collect_feedback(&mut session, interaction, ctx, options);
            continue;
        }

        let outcome = execute_plan(&session.current_plan, ctx, options.policy).await;
        session.last_output = outcome.output;
        if outcome.success {
            interaction.show(&format!("Plan executed:\n\n{}", session.last_output));
            if interaction.confirm("Was the task successful?") {
                session.phase = SessionPhase::Completed;
                info!(attempt = session.attempt_count, "task completed");
                return SessionOutcome::Completed {
                    output: session.last_output,
                };
            }
            // Exit status zero, but the user judged the result wrong: from
            // here on this attempt is a failure.
            debug!(attempt = session.attempt_count, "user rejected the result");
            session.phase = SessionPhase::NeedsFeedback;
        } else {
            session.phase = SessionPhase::NeedsFeedback;
            interaction.show(&format!(
                "The plan did not succeed:\n\n{}",
                session.last_output
            ));
        }
        if !session.has_attempts_remaining() {
            // No point collecting feedback for a retry that will never run.
            session.phase = SessionPhase::Exhausted;
            info!(
                attempts = session.attempt_count,
                "attempt budget exhausted"
            );
            return SessionOutcome::Exhausted {
                last_output: session.last_output,
            };
        }
        if !interaction.confirm("Try again with different feedback?") {
            session.phase = SessionPhase::Cancelled;
            info!(attempt = session.attempt_count, "session cancelled");
            return SessionOutcome::Cancelled;
        }
        collect_feedback(&mut session, interaction, ctx, options);
    }
}

/// Renders the plan preview shown before the approval prompt.
fn render_plan(plan: &[String]) -> String {
    let mut out = String::from("Proposed plan:");
    for (i, item) in plan.iter().enumerate() {
        let _ = write!(out, "\n  {}. {item}", i + 1);
    }
    out
}

/// Prompts for feedback, chains it, and optionally logs it.
fn collect_feedback(
    session: &mut RetrySession,
    interaction: &mut dyn Interaction,
    ctx: &ExecutionContext,
    options: &SessionOptions,
) {
    let reply = interaction.ask("What went wrong? Describe the issue:");
    let reply = reply.trim();
    if reply.is_empty() {
        return;
    }
    session.chain_feedback(reply);
    if options.record_feedback
        && let Err(e) = log_feedback(&session.task, reply, ctx.cwd())
    {
        warn!(error = %e, "failed to append feedback log");
    }
}
