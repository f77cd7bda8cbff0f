//! Cleanup of stacks captured by `console.trace`.

use crate::runtime::SANDBOX_ORIGIN;
use once_cell::sync::Lazy;
use regex::Regex;

/// Frame of the console shim's own `trace` method.
const TRACE_FRAME: &str = "Object.trace";

/// `(eval at compile (playground:sandbox:12:3), <anonymous>:4:9)`
static EVAL_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*\(eval at [^()]*(?:\([^()]*\))?[^()]*\)").expect("eval pattern is valid")
});
static BLOB_LOCATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(blob:[^)]*\)").expect("blob pattern is valid"));

/// Strip the error header, sandbox frames and evaluation-context locations
/// from a raw stack. Returns an empty string when no user frames remain.
pub fn format_trace_stack(raw_stack: &str) -> String {
    raw_stack
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("Error") && !line.contains(TRACE_FRAME))
        .map(|line| {
            let line = EVAL_LOCATION.replace_all(line, "");
            BLOB_LOCATION.replace_all(&line, "").into_owned()
        })
        .filter(|line| !line.contains(SANDBOX_ORIGIN))
        .collect::<Vec<_>>()
        .join("\n")
}
