//! Trace events recorded by instrumented runs and the summaries derived
//! from them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Upper bound on trace events recorded per run.
pub const MAX_TRACE_EVENTS: usize = 100_000;

pub const VIZ_SKIPPED: &str = "Visualization skipped for this snippet.";
pub const VIZ_DISABLED: &str = "Visualization disabled for this snippet.";
pub const VIZ_TURNED_OFF: &str = "Visualization turned off";
pub const NO_TRACE_EVENTS: &str = "No trace events captured.";

/// One source line reached during an instrumented run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// 1-based line in the submitted source.
    pub line: u32,
    /// Epoch milliseconds.
    pub time: u64,
    /// 1-based position in the run.
    pub step: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationStatus {
    pub enabled: bool,
    pub reason: Option<String>,
}

impl VisualizationStatus {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            reason: None,
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            enabled: false,
            reason: Some(reason.into()),
        }
    }
}

/// Collects trace events for one run, numbering them and enforcing
/// [`MAX_TRACE_EVENTS`].
#[derive(Debug, Default)]
pub struct TraceRecorder {
    events: Vec<TraceEvent>,
    dropped: usize,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: u32, time: u64) {
        if self.events.len() >= MAX_TRACE_EVENTS {
            self.dropped += 1;
            return;
        }
        let step = self.events.len() as u32 + 1;
        self.events.push(TraceEvent { line, time, step });
    }

    /// Events past the cap that were not recorded.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LineHits {
    pub line: u32,
    pub count: usize,
}

/// A line-to-line jump and how often it was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TraceEdge {
    pub from: u32,
    pub to: u32,
    pub count: usize,
}

/// Hit count per line, ascending by line.
pub fn summarize_trace(events: &[TraceEvent]) -> Vec<LineHits> {
    let mut counts: IndexMap<u32, usize> = IndexMap::new();
    for event in events {
        *counts.entry(event.line).or_default() += 1;
    }
    let mut hits: Vec<LineHits> = counts
        .into_iter()
        .map(|(line, count)| LineHits { line, count })
        .collect();
    hits.sort_by_key(|hit| hit.line);
    hits
}

/// Consecutive transitions, most frequent first. Ties keep first-seen order.
pub fn trace_edges(events: &[TraceEvent]) -> Vec<TraceEdge> {
    let mut edges: IndexMap<(u32, u32), usize> = IndexMap::new();
    for pair in events.windows(2) {
        *edges.entry((pair[0].line, pair[1].line)).or_default() += 1;
    }
    let mut edges: Vec<TraceEdge> = edges
        .into_iter()
        .map(|((from, to), count)| TraceEdge { from, to, count })
        .collect();
    edges.sort_by(|a, b| b.count.cmp(&a.count));
    edges
}

/// Lines in execution order with immediate repeats collapsed.
pub fn trace_path(events: &[TraceEvent]) -> Vec<u32> {
    let mut path: Vec<u32> = Vec::new();
    for event in events {
        if path.last() != Some(&event.line) {
            path.push(event.line);
        }
    }
    path
}

/// `L1 → L2 → L4`, or an empty string when nothing ran.
pub fn path_summary(events: &[TraceEvent]) -> String {
    trace_path(events)
        .iter()
        .map(|line| format!("L{line}"))
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Text to show in place of a visualization, if any.
pub fn visualization_note<'a>(
    status: &'a VisualizationStatus,
    events: &[TraceEvent],
) -> Option<&'a str> {
    if !status.enabled {
        return status.reason.as_deref();
    }
    if events.is_empty() {
        return Some(NO_TRACE_EVENTS);
    }
    None
}
