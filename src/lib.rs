//! Sandboxed JavaScript playground core.
//!
//! Snippets run in an isolated V8 context with a synthesized console, and
//! their console calls come back as typed events that are formatted into
//! display-ready entries. An optional line-level instrumentation pass
//! records which lines ran, in order.

pub mod detect;
pub mod error;
pub mod format;
pub mod instrument;
pub mod playground;
pub mod runtime;
pub mod trace;

pub use detect::node_only_reason;
pub use error::PlaygroundError;
pub use format::{build_table_output, format_output_args, format_output_value, format_trace_stack};
pub use instrument::instrument_code;
pub use playground::{
    EntryKind, FilterKey, OutputEntry, OutputFilters, Playground, RunState, RunSummary, Tone,
};
pub use runtime::{JsValue, OutputEvent, SandboxConfig, WorkerMessage};
pub use trace::{TraceEvent, VisualizationStatus};
