//! Lexical detection of snippets that need a Node.js host.
//!
//! This is a conservative heuristic over the raw text. It only gates the run
//! control; the sandbox itself simply has none of these globals.

use once_cell::sync::Lazy;
use regex::Regex;

struct Probe {
    pattern: Regex,
    reason: &'static str,
}

static PROBES: Lazy<Vec<Probe>> = Lazy::new(|| {
    [
        (r"\brequire\s*\(", "Uses require()"),
        (
            r#"(?i)\bimport\s+[^\n]+\s+from\s+['"](fs|path|os|crypto|http|https|net|tls|child_process|zlib|stream|worker_threads|url)['"]"#,
            "Uses Node.js modules",
        ),
        (r"\bprocess\.", "Uses Node.js process"),
        (r"\b__dirname\b|\b__filename\b", "Uses Node.js globals"),
    ]
    .into_iter()
    .map(|(pattern, reason)| Probe {
        pattern: Regex::new(pattern).expect("node probe pattern is valid"),
        reason,
    })
    .collect()
});

/// Return why `code` cannot run in the sandbox, or `None` if it looks
/// host-independent. Probes are checked in order; the first match wins.
pub fn node_only_reason(code: &str) -> Option<&'static str> {
    PROBES
        .iter()
        .find(|probe| probe.pattern.is_match(code))
        .map(|probe| probe.reason)
}
