//! Prompt construction for plan generation.
//!
//! - **Planning prompts**: instruct the model to emit an executable plan for
//!   a fresh task.
//! - **Refinement prompts**: replay the previous plan and the user's feedback
//!   so the next plan fixes the reported defect.
//! - **Response cleanup**: strip the markdown fences and commentary models
//!   wrap around otherwise valid plans.

use std::fmt::Write;

use crate::feedback::analyze;

/// System role sent with every generation request.
pub const SYSTEM_ROLE: &str = "You are a command-line task planner. You convert natural-language \
task descriptions into a minimal sequence of shell commands and file writes. You output only the \
plan, never explanations.";

/// Output rules shared by planning and refinement prompts.
const OUTPUT_RULES: &str = r"Rules:
- Output one shell command per line.
- No prose, no numbering, no markdown fences.
- To create a file, use exactly this form on one line:
  [WRITE_FILE:path/to/file]file content here[/WRITE_FILE]
  Example: [WRITE_FILE:hello.txt]Hello, world![/WRITE_FILE]
- Never use destructive commands (recursive deletes, disk formatting, raw device writes).
- Prefer the simplest plan that completes the task.";

/// Returns the shell-flavor hint for the host OS.
#[must_use]
pub fn os_hint() -> &'static str {
    if cfg!(windows) {
        "Target a Windows cmd shell."
    } else {
        "Target a Unix sh shell."
    }
}

/// Builds the prompt for a first planning attempt.
#[must_use]
pub fn wrap_for_planning(task: &str) -> String {
    format!(
        "{rules}\n{hint}\n\nTask: {task}",
        rules = OUTPUT_RULES,
        hint = os_hint()
    )
}

/// Builds the prompt for a refinement attempt.
///
/// Includes the previous plan, the cumulative feedback, and targeted
/// instructions derived from the feedback's defect categories.
#[must_use]
pub fn wrap_for_refinement(task: &str, previous_plan: &[String], feedback: &str) -> String {
    let mut prompt = wrap_for_planning(task);

    prompt.push_str("\n\nYour previous plan for this task was:\n");
    for item in previous_plan {
        let _ = writeln!(prompt, "{item}");
    }

    let _ = write!(
        prompt,
        "\nThe user reported this problem with it:\n{feedback}\n\n\
         Produce a corrected plan. In particular:"
    );
    for category in analyze(feedback) {
        let _ = write!(prompt, "\n- {}", category.hint());
    }
    prompt.push_str(
        "\n- Do not repeat the mistake described above.\n\
         - Keep commands that already worked; change only what failed.",
    );
    prompt
}

/// Cleans a raw model response into plan lines.
///
/// Drops markdown fences, comment lines (`#` or `//`), and blank lines.
/// Lines inside an open `[WRITE_FILE:…]` block are file content and pass
/// through untouched, so a shebang or a commented config line survives.
#[must_use]
pub fn clean_response(raw: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut in_file_block = false;

    for line in raw.lines() {
        if in_file_block {
            lines.push(line.to_string());
            if line.contains("[/WRITE_FILE]") {
                in_file_block = false;
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        if trimmed.contains("[WRITE_FILE:") && !trimmed.contains("[/WRITE_FILE]") {
            in_file_block = true;
            lines.push(trimmed.to_string());
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }
        lines.push(trimmed.to_string());
    }

    lines
}
