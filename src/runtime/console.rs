//! Console shim state and the ops the sandbox bootstrap calls into.
//!
//! The in-isolate `console` object is a thin forwarder: every call lands in
//! [`op_playground_console`] with the method name, the JSON snapshot of its
//! arguments and (for `trace`) the captured stack. All console semantics
//! (counters, timers, defaults, assertion checks) live in [`ConsoleShim`],
//! which is stored in the `OpState` and replaced for every attempt so a
//! rerun starts with fresh counters and timers.

use crate::runtime::event::{EventSender, OutputEvent, WorkerMessage};
use crate::runtime::js_value::{JsValue, MAX_PAYLOAD_BYTES};
use crate::trace::TraceRecorder;
use deno_core::{op2, OpState};
use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const DEFAULT_LABEL: &str = "default";
const DEFAULT_GROUP_LABEL: &str = "Group";
const ASSERTION_FAILED: &str = "Assertion failed";

/// Per-attempt console state. Output is sent to the owner as calls happen.
#[derive(Debug)]
pub struct ConsoleShim {
    counts: HashMap<String, u64>,
    timers: HashMap<String, Instant>,
    events: EventSender,
}

impl ConsoleShim {
    pub fn new(events: EventSender) -> Self {
        Self {
            counts: HashMap::new(),
            timers: HashMap::new(),
            events,
        }
    }

    /// Apply one console call.
    pub fn call(&mut self, method: &str, args: Vec<JsValue>, stack: String) {
        let event = match method {
            "log" => OutputEvent::Log(args),
            "info" => OutputEvent::Info(args),
            "warn" => OutputEvent::Warn(args),
            "error" => OutputEvent::Error(args),
            "table" => OutputEvent::Table(args),
            "group" => {
                let label = match args.into_iter().next() {
                    None | Some(JsValue::Undefined) => JsValue::string(DEFAULT_GROUP_LABEL),
                    Some(label) => label,
                };
                OutputEvent::Group(label)
            }
            "groupEnd" => OutputEvent::GroupEnd,
            "count" => {
                let label = label_of(&args);
                let count = self.counts.entry(label.clone()).or_insert(0);
                *count += 1;
                OutputEvent::Count {
                    label,
                    count: *count,
                }
            }
            "time" => {
                self.timers.insert(label_of(&args), Instant::now());
                return;
            }
            "timeEnd" => {
                let label = label_of(&args);
                match self.timers.remove(&label) {
                    Some(started) => OutputEvent::Time {
                        label,
                        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                    },
                    None => OutputEvent::Warn(vec![JsValue::string(format!(
                        "No such label: {label}"
                    ))]),
                }
            }
            "trace" => OutputEvent::Trace { args, stack },
            "assert" => {
                let mut args = args.into_iter();
                let passed = args.next().is_some_and(|condition| condition.is_truthy());
                if passed {
                    return;
                }
                let rest: Vec<JsValue> = args.collect();
                if rest.is_empty() {
                    OutputEvent::Assert(vec![JsValue::string(ASSERTION_FAILED)])
                } else {
                    OutputEvent::Assert(rest)
                }
            }
            "clear" => OutputEvent::Clear,
            other => {
                tracing::debug!(method = other, "ignoring unknown console method");
                return;
            }
        };
        self.emit(event);
    }

    fn emit(&self, event: OutputEvent) {
        // A closed channel means the owner already dropped this run.
        let _ = self.events.send(WorkerMessage::Event(event));
    }
}

/// `label = 'default'` parameter semantics: only a missing or undefined
/// argument falls back to the default.
fn label_of(args: &[JsValue]) -> String {
    match args.first() {
        None | Some(JsValue::Undefined) => DEFAULT_LABEL.to_string(),
        Some(label) => label.coerce_to_string(),
    }
}

fn decode_args(payload: &str) -> Vec<JsValue> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        tracing::warn!(bytes = payload.len(), "console payload over limit");
        return vec![JsValue::string(format!(
            "[console arguments dropped: payload exceeds {} bytes]",
            MAX_PAYLOAD_BYTES
        ))];
    }
    serde_json::from_str(payload).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "undecodable console payload");
        vec![JsValue::string(format!("[unreadable console arguments: {err}]"))]
    })
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[op2(fast)]
pub fn op_playground_console(
    state: &mut OpState,
    #[string] method: String,
    #[string] payload: String,
    #[string] stack: String,
) {
    let args = decode_args(&payload);
    if let Some(shim) = state.try_borrow_mut::<ConsoleShim>() {
        shim.call(&method, args, stack);
    }
}

#[op2(fast)]
pub fn op_playground_trace(state: &mut OpState, line: u32) {
    if let Some(recorder) = state.try_borrow_mut::<TraceRecorder>() {
        recorder.record(line, epoch_millis());
    }
}

deno_core::extension!(
    playground_sandbox,
    ops = [op_playground_console, op_playground_trace],
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::event::event_channel;

    fn s(text: &str) -> JsValue {
        JsValue::string(text)
    }

    fn run(calls: &[(&str, Vec<JsValue>)]) -> Vec<OutputEvent> {
        let (tx, mut rx) = event_channel();
        let mut shim = ConsoleShim::new(tx);
        for (method, args) in calls {
            shim.call(method, args.clone(), String::new());
        }
        drop(shim);

        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            match message {
                WorkerMessage::Event(event) => events.push(event),
                other => panic!("unexpected message {other:?}"),
            }
        }
        events
    }

    #[test]
    fn test_count_tracks_labels() {
        let events = run(&[
            ("count", vec![]),
            ("count", vec![s("x")]),
            ("count", vec![JsValue::Undefined]),
        ]);
        assert_eq!(
            events,
            vec![
                OutputEvent::Count { label: "default".into(), count: 1 },
                OutputEvent::Count { label: "x".into(), count: 1 },
                OutputEvent::Count { label: "default".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_time_end_without_start_warns() {
        let events = run(&[("timeEnd", vec![s("load")])]);
        assert_eq!(
            events,
            vec![OutputEvent::Warn(vec![s("No such label: load")])]
        );
    }

    #[test]
    fn test_time_end_consumes_label() {
        let events = run(&[
            ("time", vec![]),
            ("timeEnd", vec![]),
            ("timeEnd", vec![]),
        ]);
        assert_eq!(events.len(), 2);
        match &events[0] {
            OutputEvent::Time { label, elapsed_ms } => {
                assert_eq!(label, "default");
                assert!(*elapsed_ms >= 0.0);
            }
            other => panic!("expected time event, got {other:?}"),
        }
        assert_eq!(
            events[1],
            OutputEvent::Warn(vec![s("No such label: default")])
        );
    }

    #[test]
    fn test_assert_emits_only_when_falsy() {
        let events = run(&[
            ("assert", vec![JsValue::Boolean(true), s("never")]),
            ("assert", vec![JsValue::number(0.0), s("zero"), s("!")]),
            ("assert", vec![JsValue::Null]),
            ("assert", vec![]),
        ]);
        assert_eq!(
            events,
            vec![
                OutputEvent::Assert(vec![s("zero"), s("!")]),
                OutputEvent::Assert(vec![s("Assertion failed")]),
                OutputEvent::Assert(vec![s("Assertion failed")]),
            ]
        );
    }

    #[test]
    fn test_group_label_defaults() {
        let events = run(&[
            ("group", vec![]),
            ("group", vec![s("outer"), s("ignored")]),
            ("groupEnd", vec![s("ignored")]),
        ]);
        assert_eq!(
            events,
            vec![
                OutputEvent::Group(s("Group")),
                OutputEvent::Group(s("outer")),
                OutputEvent::GroupEnd,
            ]
        );
    }

    #[test]
    fn test_unknown_method_is_ignored() {
        assert!(run(&[("dir", vec![s("x")])]).is_empty());
    }

    #[test]
    fn test_calls_are_sent_immediately() {
        let (tx, mut rx) = event_channel();
        let mut shim = ConsoleShim::new(tx);
        shim.call("log", vec![s("hi")], String::new());
        assert_eq!(
            rx.try_recv().ok(),
            Some(WorkerMessage::Event(OutputEvent::Log(vec![s("hi")])))
        );
        shim.call("trace", vec![], "Error\n    at x".into());
        assert_eq!(
            rx.try_recv().ok(),
            Some(WorkerMessage::Event(OutputEvent::Trace {
                args: vec![],
                stack: "Error\n    at x".into(),
            }))
        );
    }

    #[test]
    fn test_decode_args() {
        let args = decode_args(r#"[{"type":"string","value":"a"},{"type":"number","value":"NaN"}]"#);
        assert_eq!(args[0], s("a"));
        assert!(matches!(args[1], JsValue::Number(n) if n.is_nan()));

        let broken = decode_args("not json");
        assert!(matches!(&broken[0], JsValue::String(text) if text.starts_with("[unreadable")));
    }
}
