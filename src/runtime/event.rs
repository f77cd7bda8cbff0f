//! Messages flowing from a sandbox worker to its owner.

use crate::runtime::js_value::JsValue;
use crate::trace::{TraceEvent, VisualizationStatus};
use tokio::sync::mpsc;

/// One console call or lifecycle notification, in emission order.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputEvent {
    Log(Vec<JsValue>),
    Info(Vec<JsValue>),
    Warn(Vec<JsValue>),
    Error(Vec<JsValue>),
    Table(Vec<JsValue>),
    Group(JsValue),
    GroupEnd,
    Count { label: String, count: u64 },
    Time { label: String, elapsed_ms: f64 },
    Trace { args: Vec<JsValue>, stack: String },
    Assert(Vec<JsValue>),
    Clear,
    Viz(Vec<TraceEvent>),
    VizStatus(VisualizationStatus),
    /// Terminal event of a run. Sent exactly once.
    Done,
}

impl OutputEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutputEvent::Log(_) => "log",
            OutputEvent::Info(_) => "info",
            OutputEvent::Warn(_) => "warn",
            OutputEvent::Error(_) => "error",
            OutputEvent::Table(_) => "table",
            OutputEvent::Group(_) => "group",
            OutputEvent::GroupEnd => "groupEnd",
            OutputEvent::Count { .. } => "count",
            OutputEvent::Time { .. } => "time",
            OutputEvent::Trace { .. } => "trace",
            OutputEvent::Assert(_) => "assert",
            OutputEvent::Clear => "clear",
            OutputEvent::Viz(_) => "viz",
            OutputEvent::VizStatus(_) => "viz-status",
            OutputEvent::Done => "done",
        }
    }

    /// Error event carrying a single message string.
    pub fn error_text(message: impl Into<String>) -> Self {
        OutputEvent::Error(vec![JsValue::String(message.into())])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WorkerMessage {
    Event(OutputEvent),
    /// Everything sent for the current run so far belongs to a traced
    /// attempt that threw. The owner drops it; the untraced rerun follows.
    Discard,
    /// The execution context itself failed. No `Done` follows.
    Fault(String),
}

pub type EventSender = mpsc::UnboundedSender<WorkerMessage>;
pub type EventReceiver = mpsc::UnboundedReceiver<WorkerMessage>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
