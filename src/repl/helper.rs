//! Rustyline helper: slash-command completion and history hints

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;

pub const SLASH_COMMANDS: &[&str] = &[
    "/help",
    "/new",
    "/conversations",
    "/open",
    "/retry",
    "/hall",
    "/status",
    "/reconnect",
    "/quit",
    "/exit",
];

pub struct ChatHelper {
    hinter: HistoryHinter,
}

impl ChatHelper {
    pub fn new() -> Self {
        Self {
            hinter: HistoryHinter::new(),
        }
    }
}

/// Slash commands starting with the first word of `line`
fn matching_commands(line: &str) -> Vec<&'static str> {
    let word = line.split_whitespace().next().unwrap_or("");
    SLASH_COMMANDS
        .iter()
        .copied()
        .filter(|cmd| cmd.starts_with(word))
        .collect()
}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only the command word itself is completed
        if line.starts_with('/') && pos <= line.find(' ').unwrap_or(line.len()) {
            let matches = matching_commands(line)
                .into_iter()
                .map(|cmd| Pair {
                    display: cmd.to_string(),
                    replacement: cmd.to_string(),
                })
                .collect();
            Ok((0, matches))
        } else {
            Ok((pos, vec![]))
        }
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        if line.starts_with('/') {
            None
        } else {
            self.hinter.hint(line, pos, ctx)
        }
    }
}

impl Highlighter for ChatHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[2m{}\x1b[0m", hint))
    }
}

impl Validator for ChatHelper {}

impl Helper for ChatHelper {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_commands() {
        assert_eq!(matching_commands("/re"), vec!["/retry", "/reconnect"]);
        assert_eq!(matching_commands("/open 12"), vec!["/open"]);
        assert_eq!(matching_commands("/").len(), SLASH_COMMANDS.len());
    }
}
