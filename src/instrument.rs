//! Line-level source instrumentation for execution tracing.
//!
//! A purely textual rewrite: before every line that plausibly starts a
//! statement, a `__trace(<line>);` call is inserted on its own line. Lines
//! that would break syntax if preceded by a statement (comments, closers,
//! object-literal keys, continuation keywords) are left alone. The rewrite is
//! best-effort; when it does corrupt syntax the worker notices at compile
//! time and runs the raw source instead.

use once_cell::sync::Lazy;
use regex::Regex;

/// Name of the trace callback injected into the compiled snippet.
pub const TRACE_CALLBACK: &str = "__trace";

static CLOSER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[}\]][,;]?$").expect("valid pattern"));
static KEY_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[A-Za-z0-9_$"'\[]"#).expect("valid pattern"));
static CASE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(case|default)\b").expect("valid pattern"));
static CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(else|catch|finally|case|default)\b").expect("valid pattern"));
static BRACE_CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\}\s*(else|catch|finally)\b").expect("valid pattern"));
static WHILE_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^while\b").expect("valid pattern"));
static BARE_CLOSING_BRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\}[,;]?$").expect("valid pattern"));

/// Scanner state carried from one line to the next.
#[derive(Default)]
struct LineScanner<'a> {
    in_block_comment: bool,
    last_non_empty: &'a str,
}

impl<'a> LineScanner<'a> {
    fn should_skip(&self, trimmed: &str) -> bool {
        if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with("/*") {
            return true;
        }
        if trimmed.starts_with('*') && self.in_block_comment {
            return true;
        }
        if CLOSER.is_match(trimmed) {
            return true;
        }
        if looks_like_object_key(trimmed) {
            return true;
        }
        if CONTINUATION.is_match(trimmed) || BRACE_CONTINUATION.is_match(trimmed) {
            return true;
        }
        // Tail of a do-while.
        WHILE_KEYWORD.is_match(trimmed) && BARE_CLOSING_BRACE.is_match(self.last_non_empty)
    }

    /// Returns the trace line number when a callback should precede `line`.
    fn visit(&mut self, line: &'a str, line_number: usize) -> Option<usize> {
        let trimmed = line.trim();

        if self.in_block_comment {
            if trimmed.contains("*/") {
                self.in_block_comment = false;
            }
            self.remember(trimmed);
            return None;
        }

        if trimmed.starts_with("/*") {
            if !trimmed.contains("*/") {
                self.in_block_comment = true;
            }
            self.remember(trimmed);
            return None;
        }

        if self.should_skip(trimmed) {
            self.remember(trimmed);
            return None;
        }

        self.remember(trimmed);
        Some(line_number)
    }

    fn remember(&mut self, trimmed: &'a str) {
        if !trimmed.is_empty() {
            self.last_non_empty = trimmed;
        }
    }
}

/// `identifier: value`, `"quoted": value`, `[computed]: value`; not a
/// switch label and not a ternary.
fn looks_like_object_key(trimmed: &str) -> bool {
    KEY_START.is_match(trimmed)
        && trimmed.contains(':')
        && !CASE_LABEL.is_match(trimmed)
        && !trimmed.contains('?')
}

/// Insert `__trace(<line>);` before every traceable line of `source`.
pub fn instrument_code(source: &str) -> String {
    let mut scanner = LineScanner::default();
    source
        .split('\n')
        .enumerate()
        .map(|(index, line)| match scanner.visit(line, index + 1) {
            Some(number) => format!("{TRACE_CALLBACK}({number});\n{line}"),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
