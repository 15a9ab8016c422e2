//! Plan classification.
//!
//! A generated plan arrives as an ordered list of text items. Each item is
//! either a shell command or a file-write directive of the form
//! `[WRITE_FILE:<path>]<content>[/WRITE_FILE]`. This module turns that raw
//! list into a [`ClassifiedPlan`] with three disjoint buckets: commands that
//! passed the safety gate, file operations, and rejected commands.
//!
//! Classification is pure. Nothing here touches the filesystem or a shell;
//! the runner decides what to do with the result.
//!
//! # Formatting noise
//!
//! Generation providers produce predictable garbage around otherwise valid
//! plans: items wrapped in quotes, whole plans serialized as one JSON array
//! line, directive blocks split across several items, and stray bracket
//! remnants. The parser absorbs all of these before bucketing so the rest of
//! the pipeline only ever sees clean items.

use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

use crate::core::safety::is_unsafe;

/// Literal closing marker of a file-write directive.
const CLOSE_MARKER: &str = "[/WRITE_FILE]";

/// Matches one complete file-write directive. Dotall so content spans lines.
fn directive_re() -> &'static Regex {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        // Pattern literal is fixed at compile time and covered by tests.
        #[allow(clippy::unwrap_used)]
        Regex::new(r"(?s)\[WRITE_FILE:([^\]]+)\](.*?)\[/WRITE_FILE\]").unwrap()
    });
    &RE
}

/// Matches an opening directive marker on its own.
fn open_marker_re() -> &'static Regex {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        // Pattern literal is fixed at compile time and covered by tests.
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\[WRITE_FILE:([^\]]+)\]").unwrap()
    });
    &RE
}

/// A single parsed plan instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanItem {
    /// A shell command line (not yet safety-checked).
    Command(String),
    /// A file write extracted from a directive.
    FileWrite {
        /// Target path, relative or absolute.
        path: String,
        /// Literal file content, exactly as it appeared between the markers.
        content: String,
    },
}

/// Ordered path-to-content mapping for file writes.
///
/// Preserves the position of each path's first occurrence; a later directive
/// for the same path replaces the content without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOperations {
    entries: Vec<(String, String)>,
}

impl FileOperations {
    /// Inserts a write, overwriting the content if the path is already present.
    pub fn insert(&mut self, path: String, content: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| *p == path) {
            entry.1 = content;
        } else {
            self.entries.push((path, content));
        }
    }

    /// Returns the content recorded for a path, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.as_str())
    }

    /// Iterates writes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Number of distinct target paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no writes were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of classifying a raw plan.
///
/// Every non-empty input item lands in exactly one bucket, except bracket
/// remnants of malformed array serialization, which are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedPlan {
    /// Commands that passed the safety gate, in original order.
    pub safe_commands: Vec<String>,
    /// File writes keyed by path; the last directive for a path wins.
    pub file_operations: FileOperations,
    /// Commands rejected by the safety denylist, in original order.
    pub unsafe_commands: Vec<String>,
}

impl ClassifiedPlan {
    /// Returns `true` if any command was rejected.
    #[must_use]
    pub fn has_unsafe(&self) -> bool {
        !self.unsafe_commands.is_empty()
    }
}

/// Strips surrounding whitespace and matching quote pairs from a plan item.
fn strip_wrapping(raw: &str) -> &str {
    let mut s = raw.trim();
    while s.len() >= 2 {
        let bytes = s.as_bytes();
        let first = bytes[0];
        let last = bytes[s.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            s = s[1..s.len() - 1].trim();
        } else {
            break;
        }
    }
    s
}

/// Returns the last opening marker with no closing marker after it, if any.
fn unterminated_open(item: &str) -> Option<(usize, usize, String)> {
    let caps = open_marker_re().captures_iter(item).last()?;
    let whole = caps.get(0)?;
    if item[whole.end()..].contains(CLOSE_MARKER) {
        return None;
    }
    let path = caps.get(1)?.as_str().to_string();
    Some((whole.start(), whole.end(), path))
}

/// Joins directive blocks that span multiple plan items into single items.
///
/// Providers sometimes emit the opening marker, the file content, and the
/// closing marker as separate plan lines. This pass stitches such a block back
/// into one normalized directive item whose content is the interior lines
/// joined with newlines. An opening marker that is never closed is left
/// untouched, so the dangling line surfaces as a failing command instead of
/// silently swallowing the rest of the plan into a file.
fn reassemble_blocks(plan: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(plan.len());
    let mut i = 0;
    while i < plan.len() {
        let item = &plan[i];
        let Some((open_start, open_end, path)) = unterminated_open(item) else {
            out.push(item.clone());
            i += 1;
            continue;
        };
        let Some((close_idx, close_pos)) = plan[i + 1..]
            .iter()
            .enumerate()
            .find_map(|(k, it)| it.find(CLOSE_MARKER).map(|pos| (i + 1 + k, pos)))
        else {
            // Never closed: leave the block alone.
            out.push(item.clone());
            i += 1;
            continue;
        };

        // Text before the opening marker stays a separate item.
        let head = item[..open_start].trim();
        if !head.is_empty() {
            out.push(head.to_string());
        }

        let mut parts: Vec<&str> = Vec::new();
        let tail = &item[open_end..];
        if !tail.is_empty() {
            parts.push(tail);
        }
        for mid in &plan[i + 1..close_idx] {
            parts.push(mid);
        }
        let prefix = &plan[close_idx][..close_pos];
        if !prefix.is_empty() {
            parts.push(prefix);
        }
        out.push(format!(
            "[WRITE_FILE:{path}]{}{CLOSE_MARKER}",
            parts.join("\n")
        ));

        // Text after the closing marker is processed as its own item.
        let rest = plan[close_idx][close_pos + CLOSE_MARKER.len()..].trim();
        if !rest.is_empty() {
            out.push(rest.to_string());
        }
        i = close_idx + 1;
    }
    out
}

/// Parses raw plan items into tagged instructions.
///
/// Handles quote/whitespace stripping, directive extraction (including
/// multiple directives in one item and blocks split across items), and
/// flattening of items that are themselves a JSON array of strings. Empty
/// items are dropped. Commands are *not* safety-checked here; that is
/// [`classify`]'s job.
#[must_use]
pub fn parse_items(plan: &[String]) -> Vec<PlanItem> {
    let mut queue: VecDeque<String> = reassemble_blocks(plan).into();
    let mut items = Vec::new();

    while let Some(raw) = queue.pop_front() {
        let line = strip_wrapping(&raw);
        if line.is_empty() {
            continue;
        }

        let mut found_directive = false;
        for cap in directive_re().captures_iter(line) {
            let (Some(path), Some(content)) = (cap.get(1), cap.get(2)) else {
                continue;
            };
            items.push(PlanItem::FileWrite {
                path: path.as_str().trim().to_string(),
                content: content.as_str().to_string(),
            });
            found_directive = true;
        }
        if found_directive {
            continue;
        }

        // A whole plan serialized as one JSON array line: re-process each
        // element individually.
        if line.starts_with('[')
            && line.ends_with(']')
            && let Ok(elements) = serde_json::from_str::<Vec<String>>(line)
        {
            for element in elements.into_iter().rev() {
                queue.push_front(element);
            }
            continue;
        }

        items.push(PlanItem::Command(line.to_string()));
    }

    items
}

/// Classifies a raw plan into safe commands, file operations, and rejected
/// commands.
///
/// Pure function: classifying the same input twice yields identical results.
/// The safety check runs before bracket-remnant dropping, so a destructive
/// command wrapped in stray brackets is rejected rather than discarded.
#[must_use]
pub fn classify(plan: &[String]) -> ClassifiedPlan {
    let mut classified = ClassifiedPlan::default();
    for item in parse_items(plan) {
        match item {
            PlanItem::FileWrite { path, content } => {
                classified.file_operations.insert(path, content);
            }
            PlanItem::Command(text) => {
                if is_unsafe(&text) {
                    classified.unsafe_commands.push(text);
                } else if text.starts_with('[') && text.ends_with(']') {
                    // Bracket remnant of malformed array output, dropped.
                } else {
                    classified.safe_commands.push(text);
                }
            }
        }
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    // =========================================================================
    // strip_wrapping Tests
    // =========================================================================

    mod strip_wrapping_tests {
        use super::*;

        /// Tests whitespace trimming.
        #[test]
        fn trims_whitespace() {
            assert_eq!(strip_wrapping("  echo hello  "), "echo hello");
        }

        /// Tests removal of one pair of double quotes.
        #[test]
        fn strips_double_quotes() {
            assert_eq!(strip_wrapping("\"echo hello\""), "echo hello");
        }

        /// Tests removal of one pair of single quotes.
        #[test]
        fn strips_single_quotes() {
            assert_eq!(strip_wrapping("'echo hello'"), "echo hello");
        }

        /// Tests removal of nested quote pairs.
        #[test]
        fn strips_nested_pairs() {
            assert_eq!(strip_wrapping("\"'echo hello'\""), "echo hello");
        }

        /// Tests that mismatched quotes are kept.
        #[test]
        fn keeps_mismatched_quotes() {
            assert_eq!(strip_wrapping("\"echo hello'"), "\"echo hello'");
        }

        /// Tests that interior quotes survive.
        #[test]
        fn keeps_interior_quotes() {
            assert_eq!(strip_wrapping("echo \"hello\" there"), "echo \"hello\" there");
            assert_eq!(strip_wrapping("'cd \"my dir\"'"), "cd \"my dir\"");
        }

        /// Tests empty and quote-only inputs.
        #[test]
        fn handles_degenerate_inputs() {
            assert_eq!(strip_wrapping(""), "");
            assert_eq!(strip_wrapping("\"\""), "");
            assert_eq!(strip_wrapping("\""), "\"");
        }
    }

    // =========================================================================
    // parse_items Tests
    // =========================================================================

    mod parse_items_tests {
        use super::*;

        /// Tests that a command line becomes a tagged command.
        #[test]
        fn command_line_is_tagged() {
            let items = parse_items(&plan(&["echo hello"]));
            assert_eq!(items, vec![PlanItem::Command("echo hello".to_string())]);
        }

        /// Tests that a directive becomes a tagged file write.
        #[test]
        fn directive_is_tagged() {
            let items = parse_items(&plan(&["[WRITE_FILE:out.txt]done[/WRITE_FILE]"]));
            assert_eq!(
                items,
                vec![PlanItem::FileWrite {
                    path: "out.txt".to_string(),
                    content: "done".to_string(),
                }]
            );
        }

        /// Tests that empty and whitespace-only items are dropped.
        #[test]
        fn drops_empty_items() {
            let items = parse_items(&plan(&["", "   ", "echo hi"]));
            assert_eq!(items.len(), 1);
        }

        /// Tests multiple directives inside one item.
        #[test]
        fn extracts_multiple_directives_per_item() {
            let items = parse_items(&plan(&[
                "[WRITE_FILE:a.txt]A[/WRITE_FILE][WRITE_FILE:b.txt]B[/WRITE_FILE]",
            ]));
            assert_eq!(
                items,
                vec![
                    PlanItem::FileWrite {
                        path: "a.txt".to_string(),
                        content: "A".to_string(),
                    },
                    PlanItem::FileWrite {
                        path: "b.txt".to_string(),
                        content: "B".to_string(),
                    },
                ]
            );
        }

        /// Tests that directive content may contain embedded newlines.
        #[test]
        fn content_keeps_embedded_newlines() {
            let items = parse_items(&plan(&[
                "[WRITE_FILE:script.sh]#!/bin/sh\necho one\necho two[/WRITE_FILE]",
            ]));
            assert_eq!(
                items,
                vec![PlanItem::FileWrite {
                    path: "script.sh".to_string(),
                    content: "#!/bin/sh\necho one\necho two".to_string(),
                }]
            );
        }

        /// Tests that command-like text inside a directive stays file content.
        #[test]
        fn command_text_inside_directive_is_content() {
            let items = parse_items(&plan(&[
                "[WRITE_FILE:run.sh]rm -rf ./build[/WRITE_FILE]",
            ]));
            assert_eq!(
                items,
                vec![PlanItem::FileWrite {
                    path: "run.sh".to_string(),
                    content: "rm -rf ./build".to_string(),
                }]
            );
        }

        /// Tests reassembly of a directive block split across plan items.
        #[test]
        fn reassembles_block_across_items() {
            let items = parse_items(&plan(&[
                "[WRITE_FILE:notes.txt]first line",
                "second line",
                "third line[/WRITE_FILE]",
                "echo done",
            ]));
            assert_eq!(
                items,
                vec![
                    PlanItem::FileWrite {
                        path: "notes.txt".to_string(),
                        content: "first line\nsecond line\nthird line".to_string(),
                    },
                    PlanItem::Command("echo done".to_string()),
                ]
            );
        }

        /// Tests reassembly when the markers sit on their own lines.
        #[test]
        fn reassembles_block_with_bare_markers() {
            let items = parse_items(&plan(&[
                "[WRITE_FILE:data.csv]",
                "a,b",
                "1,2",
                "[/WRITE_FILE]",
            ]));
            assert_eq!(
                items,
                vec![PlanItem::FileWrite {
                    path: "data.csv".to_string(),
                    content: "a,b\n1,2".to_string(),
                }]
            );
        }

        /// Tests that blank interior lines survive reassembly.
        #[test]
        fn reassembly_keeps_blank_content_lines() {
            let items = parse_items(&plan(&[
                "[WRITE_FILE:doc.md]# Title",
                "",
                "Body[/WRITE_FILE]",
            ]));
            assert_eq!(
                items,
                vec![PlanItem::FileWrite {
                    path: "doc.md".to_string(),
                    content: "# Title\n\nBody".to_string(),
                }]
            );
        }

        /// Tests that a command after the closing marker is kept.
        #[test]
        fn keeps_command_after_closing_marker() {
            let items = parse_items(&plan(&[
                "[WRITE_FILE:x.txt]body",
                "end[/WRITE_FILE] echo after",
            ]));
            assert_eq!(
                items,
                vec![
                    PlanItem::FileWrite {
                        path: "x.txt".to_string(),
                        content: "body\nend".to_string(),
                    },
                    PlanItem::Command("echo after".to_string()),
                ]
            );
        }

        /// Tests that a never-closed directive falls through as commands
        /// instead of swallowing the rest of the plan into a file.
        #[test]
        fn unterminated_block_falls_through() {
            let items = parse_items(&plan(&["[WRITE_FILE:x.txt]oops", "echo still runs"]));
            assert_eq!(
                items,
                vec![
                    PlanItem::Command("[WRITE_FILE:x.txt]oops".to_string()),
                    PlanItem::Command("echo still runs".to_string()),
                ]
            );
        }

        /// Tests flattening of a plan serialized as one JSON array line.
        #[test]
        fn flattens_json_array_item() {
            let items = parse_items(&plan(&[r#"["echo a", "echo b"]"#]));
            assert_eq!(
                items,
                vec![
                    PlanItem::Command("echo a".to_string()),
                    PlanItem::Command("echo b".to_string()),
                ]
            );
        }

        /// Tests that flattened elements are re-parsed, so a directive inside
        /// a JSON array is still extracted.
        #[test]
        fn flattened_elements_are_reparsed() {
            let items = parse_items(&plan(&[
                r#"["echo a", "[WRITE_FILE:f.txt]hi[/WRITE_FILE]"]"#,
            ]));
            assert_eq!(
                items,
                vec![
                    PlanItem::Command("echo a".to_string()),
                    PlanItem::FileWrite {
                        path: "f.txt".to_string(),
                        content: "hi".to_string(),
                    },
                ]
            );
        }

        /// Tests that an unparseable bracket line stays a command for the
        /// classifier to judge.
        #[test]
        fn unparseable_bracket_line_stays_command() {
            let items = parse_items(&plan(&["[not json]"]));
            assert_eq!(items, vec![PlanItem::Command("[not json]".to_string())]);
        }

        /// Tests that quoted items are unwrapped before parsing.
        #[test]
        fn unwraps_quoted_directive() {
            let items = parse_items(&plan(&["\"[WRITE_FILE:q.txt]quoted[/WRITE_FILE]\""]));
            assert_eq!(
                items,
                vec![PlanItem::FileWrite {
                    path: "q.txt".to_string(),
                    content: "quoted".to_string(),
                }]
            );
        }

        /// Tests that the directive path is trimmed.
        #[test]
        fn trims_directive_path() {
            let items = parse_items(&plan(&["[WRITE_FILE: out.txt ]x[/WRITE_FILE]"]));
            assert_eq!(
                items,
                vec![PlanItem::FileWrite {
                    path: "out.txt".to_string(),
                    content: "x".to_string(),
                }]
            );
        }
    }

    // =========================================================================
    // FileOperations Tests
    // =========================================================================

    mod file_operations_tests {
        use super::*;

        /// Tests insertion and lookup.
        #[test]
        fn insert_and_get() {
            let mut ops = FileOperations::default();
            ops.insert("a.txt".to_string(), "A".to_string());

            assert_eq!(ops.get("a.txt"), Some("A"));
            assert_eq!(ops.get("missing.txt"), None);
            assert_eq!(ops.len(), 1);
            assert!(!ops.is_empty());
        }

        /// Tests that a later write for the same path wins without moving it.
        #[test]
        fn last_write_wins_in_place() {
            let mut ops = FileOperations::default();
            ops.insert("a.txt".to_string(), "first".to_string());
            ops.insert("b.txt".to_string(), "B".to_string());
            ops.insert("a.txt".to_string(), "second".to_string());

            assert_eq!(ops.len(), 2);
            assert_eq!(ops.get("a.txt"), Some("second"));
            let order: Vec<&str> = ops.iter().map(|(p, _)| p).collect();
            assert_eq!(order, vec!["a.txt", "b.txt"]);
        }

        /// Tests iteration order matches insertion order.
        #[test]
        fn iterates_in_insertion_order() {
            let mut ops = FileOperations::default();
            ops.insert("z.txt".to_string(), "1".to_string());
            ops.insert("a.txt".to_string(), "2".to_string());
            ops.insert("m.txt".to_string(), "3".to_string());

            let order: Vec<&str> = ops.iter().map(|(p, _)| p).collect();
            assert_eq!(order, vec!["z.txt", "a.txt", "m.txt"]);
        }
    }

    // =========================================================================
    // classify Tests
    // =========================================================================

    mod classify_tests {
        use super::*;

        /// Tests the canonical mixed plan.
        #[test]
        fn splits_mixed_plan_into_buckets() {
            let classified = classify(&plan(&[
                "echo hello",
                "[WRITE_FILE:out.txt]done[/WRITE_FILE]",
                "rm -rf /",
            ]));

            assert_eq!(classified.safe_commands, vec!["echo hello"]);
            assert_eq!(classified.file_operations.get("out.txt"), Some("done"));
            assert_eq!(classified.unsafe_commands, vec!["rm -rf /"]);
            assert!(classified.has_unsafe());
        }

        /// Tests that an all-safe plan has no rejections.
        #[test]
        fn all_safe_plan_has_no_rejections() {
            let classified = classify(&plan(&["echo a", "ls", "pwd"]));

            assert_eq!(classified.safe_commands.len(), 3);
            assert!(classified.file_operations.is_empty());
            assert!(!classified.has_unsafe());
        }

        /// Tests that command order is preserved within each bucket.
        #[test]
        fn preserves_order_within_buckets() {
            let classified = classify(&plan(&[
                "echo one",
                "sudo rm /etc/x",
                "echo two",
                "dd if=/dev/zero of=/dev/sda",
                "echo three",
            ]));

            assert_eq!(
                classified.safe_commands,
                vec!["echo one", "echo two", "echo three"]
            );
            assert_eq!(
                classified.unsafe_commands,
                vec!["sudo rm /etc/x", "dd if=/dev/zero of=/dev/sda"]
            );
        }

        /// Tests that later directives for the same path overwrite earlier ones.
        #[test]
        fn same_path_last_directive_wins() {
            let classified = classify(&plan(&[
                "[WRITE_FILE:cfg.ini]old[/WRITE_FILE]",
                "[WRITE_FILE:cfg.ini]new[/WRITE_FILE]",
            ]));

            assert_eq!(classified.file_operations.len(), 1);
            assert_eq!(classified.file_operations.get("cfg.ini"), Some("new"));
        }

        /// Tests that quoted items classify like their unquoted form.
        #[test]
        fn strips_quotes_before_classifying() {
            let classified = classify(&plan(&["\"echo hello\"", "'ls -la'"]));
            assert_eq!(classified.safe_commands, vec!["echo hello", "ls -la"]);
        }

        /// Tests that bracket remnants are dropped silently.
        #[test]
        fn drops_bracket_remnants() {
            let classified = classify(&plan(&["[note: created files]", "echo hi", "[]"]));

            assert_eq!(classified.safe_commands, vec!["echo hi"]);
            assert!(!classified.has_unsafe());
        }

        /// Tests that an unsafe command wrapped in brackets is rejected, not
        /// dropped as a remnant.
        #[test]
        fn unsafe_in_brackets_is_rejected() {
            let classified = classify(&plan(&["[rm -rf /]"]));

            assert!(classified.safe_commands.is_empty());
            assert_eq!(classified.unsafe_commands, vec!["[rm -rf /]"]);
        }

        /// Known edge case: a bare shell `test` command is indistinguishable
        /// from a bracket remnant and gets dropped.
        #[test]
        fn shell_test_builtin_is_dropped_as_remnant() {
            let classified = classify(&plan(&["[ -f out.txt ]"]));
            assert!(classified.safe_commands.is_empty());
            assert!(!classified.has_unsafe());
        }

        /// Tests that a JSON array plan flattens into ordinary buckets.
        #[test]
        fn json_array_plan_flattens() {
            let classified = classify(&plan(&[
                r#"["echo a", "[WRITE_FILE:f.txt]hi[/WRITE_FILE]", "rm -rf /"]"#,
            ]));

            assert_eq!(classified.safe_commands, vec!["echo a"]);
            assert_eq!(classified.file_operations.get("f.txt"), Some("hi"));
            assert_eq!(classified.unsafe_commands, vec!["rm -rf /"]);
        }

        /// Tests idempotence: the same plan always classifies identically.
        #[test]
        fn classification_is_idempotent() {
            let input = plan(&[
                "echo hello",
                "[WRITE_FILE:out.txt]done[/WRITE_FILE]",
                "rm -rf /",
                "[artifact]",
                r#"["echo x"]"#,
            ]);

            let first = classify(&input);
            let second = classify(&input);

            assert_eq!(first, second);
        }

        /// Tests classifying an empty plan.
        #[test]
        fn empty_plan_classifies_empty() {
            let classified = classify(&[]);

            assert!(classified.safe_commands.is_empty());
            assert!(classified.file_operations.is_empty());
            assert!(classified.unsafe_commands.is_empty());
        }
    }
}
