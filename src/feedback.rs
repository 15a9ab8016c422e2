//! Feedback analysis and debug logging.
//!
//! Free-text feedback from the user is mined for recurring defect categories
//! so the refinement prompt can steer the next plan toward the actual problem
//! instead of repeating a generic "try harder" instruction. In debug mode the
//! raw feedback is also appended to a log file for later inspection.

use std::io::Write;
use std::path::Path;

/// Name of the feedback log written in debug mode.
pub const FEEDBACK_LOG_FILE: &str = "taskwright_feedback.log";

/// A recognized defect category in user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// A file the plan depended on was never created.
    MissingFile,
    /// Files or commands targeted the wrong location.
    WrongPath,
    /// An operation was blocked by filesystem permissions.
    Permissions,
    /// The user flagged the plan as dangerous.
    Safety,
    /// The plan ran but produced the wrong result.
    WrongBehavior,
}

impl Category {
    /// Returns the instruction added to the refinement prompt for this
    /// category.
    #[must_use]
    pub const fn hint(&self) -> &'static str {
        match self {
            Self::MissingFile => {
                "Create every file before any command that reads or executes it."
            }
            Self::WrongPath => {
                "Double-check target paths and resolve them against the working directory."
            }
            Self::Permissions => "Avoid operations that require elevated permissions.",
            Self::Safety => "Use only non-destructive commands.",
            Self::WrongBehavior => {
                "Re-read the task and verify each command produces the required output."
            }
        }
    }
}

/// Keyword buckets, checked in a fixed order so analysis is deterministic.
const KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::MissingFile,
        &[
            "missing",
            "not found",
            "no such file",
            "doesn't exist",
            "does not exist",
            "never created",
        ],
    ),
    (
        Category::WrongPath,
        &[
            "wrong path",
            "wrong directory",
            "wrong location",
            "wrong folder",
            "wrong place",
        ],
    ),
    (Category::Permissions, &["permission", "denied", "not allowed"]),
    (Category::Safety, &["unsafe", "dangerous", "destructive"]),
    (
        Category::WrongBehavior,
        &[
            "wrong output",
            "incorrect",
            "unexpected",
            "didn't work",
            "did not work",
        ],
    ),
];

/// Extracts defect categories from a feedback string.
///
/// Matching is case-insensitive substring search; each category appears at
/// most once, in the fixed order of the keyword table.
#[must_use]
pub fn analyze(feedback: &str) -> Vec<Category> {
    let lower = feedback.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .collect()
}

/// Appends a timestamped feedback entry to the log file in `dir`.
///
/// # Errors
///
/// Returns any I/O error from opening or writing the log file. Callers treat
/// a failure here as a warning, never as fatal.
pub fn log_feedback(task: &str, feedback: &str, dir: &Path) -> std::io::Result<()> {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let entry = format!("[{timestamp}] task: {task}\n  feedback: {feedback}\n");
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(FEEDBACK_LOG_FILE))?;
    file.write_all(entry.as_bytes())
}
