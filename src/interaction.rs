//! User interaction boundary.
//!
//! The session talks to the user only through the [`Interaction`] trait, so
//! tests script their answers and the binary plugs in a stdin/stdout console.
//! Diagnostics go through `tracing`; everything the user is meant to read
//! goes through here.

use std::io::{BufRead, Write};

/// Prompting surface for the feedback loop.
pub trait Interaction {
    /// Displays text to the user.
    fn show(&mut self, text: &str);

    /// Asks a yes/no question. Defaults to "no" on anything but an explicit
    /// yes.
    fn confirm(&mut self, prompt: &str) -> bool;

    /// Asks an open question and returns the reply line.
    fn ask(&mut self, prompt: &str) -> String;
}

/// Returns true for an affirmative reply, case-insensitively.
fn is_yes(reply: &str) -> bool {
    matches!(reply.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Console implementation over stdin/stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Console {
    fn read_line() -> String {
        let mut reply = String::new();
        if std::io::stdin().lock().read_line(&mut reply).is_err() {
            return String::new();
        }
        reply
    }
}

impl Interaction for Console {
    fn show(&mut self, text: &str) {
        println!("{text}");
    }

    fn confirm(&mut self, prompt: &str) -> bool {
        print!("{prompt} [y/N]: ");
        let _ = std::io::stdout().flush();
        is_yes(&Self::read_line())
    }

    fn ask(&mut self, prompt: &str) -> String {
        print!("{prompt} ");
        let _ = std::io::stdout().flush();
        Self::read_line().trim().to_string()
    }
}
