//! Plan execution orchestration.
//!
//! The runner takes a raw plan, classifies it, and drives the executor over
//! the result: a plan with any rejected command fails closed before a single
//! side effect happens; otherwise file writes run first (commands routinely
//! invoke a script created moments earlier in the same plan), then commands
//! in original order. Commands do not short-circuit on failure, so one bad
//! item never hides the results of the rest.

use std::fmt::Write;

use tracing::{debug, warn};

use crate::core::executor::{ExecutionContext, run_command, write_file};
use crate::core::parser::classify;

/// Policy knobs for deciding overall plan success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Report overall success when at least one file write occurred and every
    /// file write succeeded, even if later commands failed.
    ///
    /// This preserves the historical behavior for file-centric tasks, where
    /// trailing command issues (a missing optional tool, say) should not sink
    /// an attempt whose real deliverable is the files. It can mask genuine
    /// command failures, which is why it is a visible flag and not a hidden
    /// special case. Defaults to `true`.
    pub file_partial_success: bool,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            file_partial_success: true,
        }
    }
}

/// Aggregate outcome of executing a whole plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Whether the plan counts as successful under the active policy.
    pub success: bool,
    /// Combined per-item output, in execution order.
    pub output: String,
}

/// Executes a raw plan against the given context.
///
/// Classification happens here; callers hand over the plan exactly as the
/// provider produced it. If any item is rejected by the safety gate the whole
/// plan is refused with zero side effects and the output enumerates every
/// offending command.
pub async fn execute_plan(
    plan: &[String],
    ctx: &mut ExecutionContext,
    policy: ExecutionPolicy,
) -> PlanOutcome {
    let classified = classify(plan);

    if classified.has_unsafe() {
        warn!(
            rejected = classified.unsafe_commands.len(),
            "refusing plan with unsafe commands"
        );
        let mut output = String::from("Plan contains potentially unsafe commands:");
        for command in &classified.unsafe_commands {
            let _ = write!(output, "\n- {command}");
        }
        return PlanOutcome {
            success: false,
            output,
        };
    }

    debug!(
        files = classified.file_operations.len(),
        commands = classified.safe_commands.len(),
        "executing plan"
    );

    let mut segments: Vec<String> = Vec::new();

    let mut files_ok = true;
    for (path, content) in classified.file_operations.iter() {
        let result = write_file(path, content, ctx).await;
        files_ok &= result.success;
        segments.push(result.message);
    }

    let mut commands_ok = true;
    for command in &classified.safe_commands {
        let result = run_command(command, ctx).await;
        commands_ok &= result.success;
        let label = if result.success { "Success" } else { "Error" };
        segments.push(format!("Command: {command}\n{label}: {}", result.message));
    }

    let file_centric_success = policy.file_partial_success
        && !classified.file_operations.is_empty()
        && files_ok;
    let success = (files_ok && commands_ok) || file_centric_success;

    PlanOutcome {
        success,
        output: segments.join("\n\n"),
    }
}
