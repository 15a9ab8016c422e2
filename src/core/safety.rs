//! Destructive-command detection for generated plans.
//!
//! Generated plans are untrusted input: a malformed or hostile model response
//! can contain commands that destroy data or the host. This module implements
//! the denylist gate that the parser applies to every command line before it
//! is allowed anywhere near a shell.
//!
//! Matching is case-insensitive and a single pattern hit rejects the whole
//! line. The list intentionally covers both Unix and Windows command flavors
//! because plans are generated with OS hints and models routinely mix them up.

use regex::Regex;
use std::sync::LazyLock;

/// Denylist of destructive operation patterns.
///
/// Grouped by category:
/// - recursive force deletes (`rm -rf` and variants, `sudo rm`)
/// - filesystem/device destruction (`mkfs`, `fdisk`, `dd if=`, raw writes
///   to block devices)
/// - the classic fork bomb
/// - Windows deletes and formatting (`del /f`, `rmdir /s`, `rd /s`,
///   `format X:`, `deltree`)
/// - piping a downloaded script straight into a shell
/// - host power control as the leading word
const UNSAFE_PATTERNS: &[&str] = &[
    r"(?i)\brm\s+(?:-rf|-fr)\b",
    r"(?i)\brm\s+--force\s+--recursive\b",
    r"(?i)\brm\s+--recursive\s+--force\b",
    r"(?i)\bsudo\s+rm\b",
    r"(?i)\bmkfs",
    r"(?i)\bfdisk\b",
    r"(?i)\bdd\s+if=",
    r"(?i)>\s*/dev/sd",
    r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
    r"(?i)\bdel\s+/[fsq]",
    r"(?i)\brmdir\s+/s\b",
    r"(?i)\brd\s+/s\b",
    r"(?i)\bformat\s+[a-z]:",
    r"(?i)\bdeltree\b",
    r"(?i)\b(?:curl|wget)\b[^|]*\|\s*(?:ba|da|z)?sh\b",
    r"(?i)^\s*(?:sudo\s+)?shutdown\b",
    r"(?i)^\s*(?:sudo\s+)?reboot\b",
];

/// Returns the compiled denylist, built once on first use.
fn unsafe_regexes() -> &'static [Regex] {
    static REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        UNSAFE_PATTERNS
            .iter()
            .map(|p| {
                // Pattern literals are fixed at compile time and covered by tests.
                #[allow(clippy::unwrap_used)]
                Regex::new(p).unwrap()
            })
            .collect()
    });
    &REGEXES
}

/// Returns `true` if the command line matches any destructive pattern.
///
/// The check is intentionally aggressive: a command that merely *mentions*
/// a destructive operation (for example inside an `echo`) is still rejected.
/// False positives cost a regeneration round; false negatives cost data.
///
/// # Examples
///
/// ```
/// use taskwright::core::safety::is_unsafe;
///
/// assert!(is_unsafe("rm -rf /"));
/// assert!(is_unsafe("sudo rm /etc/passwd"));
/// assert!(is_unsafe("FORMAT C:"));
/// assert!(!is_unsafe("echo hello"));
/// assert!(!is_unsafe("mkdir -p src"));
/// ```
#[must_use]
pub fn is_unsafe(command: &str) -> bool {
    unsafe_regexes().iter().any(|re| re.is_match(command))
}
