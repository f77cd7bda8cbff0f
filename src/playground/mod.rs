//! Run orchestration: one execution context at a time, its event stream
//! folded into display-ready entries.
//!
//! A [`Playground`] owns at most one live context. Starting a run tears
//! down whatever came before it, so output from an abandoned run can never
//! reach the new run's entries: each run gets its own event channel and the
//! old receiver is dropped together with the old context.
//!
//! The orchestrator never blocks on the worker. Hosts either call
//! [`Playground::poll`] from their own loop or await [`Playground::settle`].

mod entry;

pub use entry::{EntryKind, FilterKey, OutputEntry, OutputFilters, Tone};

use crate::detect::node_only_reason;
use crate::error::PlaygroundError;
use crate::format::{build_table_output, format_output_args, format_trace_stack};
use crate::runtime::config::SandboxConfig;
use crate::runtime::event::{event_channel, EventReceiver, OutputEvent, WorkerMessage};
use crate::runtime::handle::{ContextSpawner, ExecutionContext, IsolateSpawner};
use crate::trace::{visualization_note, TraceEvent, VisualizationStatus};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc::error::TryRecvError;

const DEFAULT_GROUP_LABEL: &str = "Group";
const WORKER_ERROR: &str = "Worker error";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
}

/// Timing of the last finished run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub finished_at: SystemTime,
    pub duration: Duration,
}

impl RunSummary {
    /// Whole milliseconds, e.g. `12ms`.
    pub fn duration_label(&self) -> String {
        format!("{}ms", self.duration.as_millis())
    }
}

struct ActiveRun<C> {
    context: C,
    events: EventReceiver,
    started: Instant,
    deadline: Option<Instant>,
}

pub struct Playground<S: ContextSpawner = IsolateSpawner> {
    spawner: S,
    config: SandboxConfig,
    active: Option<ActiveRun<S::Context>>,
    state: RunState,
    entries: Vec<OutputEntry>,
    group_depth: usize,
    trace_events: Vec<TraceEvent>,
    viz_status: VisualizationStatus,
    filters: OutputFilters,
    last_run: Option<RunSummary>,
}

impl Playground<IsolateSpawner> {
    /// Orchestrator backed by real V8 isolates.
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_spawner(IsolateSpawner, config)
    }
}

impl Default for Playground<IsolateSpawner> {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl<S: ContextSpawner> Playground<S> {
    pub fn with_spawner(spawner: S, config: SandboxConfig) -> Self {
        Self {
            spawner,
            config,
            active: None,
            state: RunState::Idle,
            entries: Vec::new(),
            group_depth: 0,
            trace_events: Vec::new(),
            viz_status: VisualizationStatus::default(),
            filters: OutputFilters::default(),
            last_run: None,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Starting | RunState::Running)
    }

    /// Whether a run control for `code` should be disabled.
    pub fn run_disabled(&self, code: &str) -> bool {
        self.is_running() || node_only_reason(code).is_some()
    }

    /// Start a run unless one is in flight or `code` needs a Node.js host.
    pub fn run(&mut self, code: &str) -> Result<(), PlaygroundError> {
        if let Some(reason) = node_only_reason(code) {
            return Err(PlaygroundError::NodeOnly(reason.to_string()));
        }
        if self.is_running() {
            return Err(PlaygroundError::AlreadyRunning);
        }
        self.start(code)
    }

    /// Start a run, terminating any run in flight. Nothing from the
    /// terminated run is kept.
    pub fn restart(&mut self, code: &str) -> Result<(), PlaygroundError> {
        if let Some(reason) = node_only_reason(code) {
            return Err(PlaygroundError::NodeOnly(reason.to_string()));
        }
        self.start(code)
    }

    fn start(&mut self, code: &str) -> Result<(), PlaygroundError> {
        self.state = RunState::Starting;
        self.release_context();
        self.reset_output();
        self.trace_events.clear();
        self.viz_status = VisualizationStatus::default();

        let started = Instant::now();
        let (events, receiver) = event_channel();
        let mut context = match self.spawner.spawn(&self.config, events) {
            Ok(context) => context,
            Err(err) => {
                self.finish_failed(started, err.to_string());
                return Err(err);
            }
        };
        if let Err(err) = context.post(code) {
            context.terminate();
            self.finish_failed(started, err.to_string());
            return Err(err);
        }

        tracing::debug!(bytes = code.len(), "run started");
        self.active = Some(ActiveRun {
            context,
            events: receiver,
            started,
            deadline: self.config.execution_timeout.map(|timeout| started + timeout),
        });
        self.state = RunState::Running;
        Ok(())
    }

    /// Apply every event already delivered, without waiting. Returns whether
    /// a run is still live afterwards.
    ///
    /// The timeout only fires once the delivered events are drained, so a run
    /// that finished before the deadline passed is never reported as timed out.
    pub fn poll(&mut self) -> bool {
        loop {
            let Some(active) = self.active.as_mut() else {
                return false;
            };
            match active.events.try_recv() {
                Ok(message) => self.apply(message),
                Err(TryRecvError::Empty) => {
                    if active.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        self.time_out();
                        return false;
                    }
                    return true;
                }
                Err(TryRecvError::Disconnected) => {
                    self.fail(WORKER_ERROR.to_string());
                    return false;
                }
            }
        }
    }

    /// Apply events as they arrive until the current run ends.
    pub async fn settle(&mut self) {
        while let Some(active) = self.active.as_mut() {
            let message = match active.deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline.into(), active.events.recv()).await {
                        Ok(message) => message,
                        Err(_) => {
                            self.time_out();
                            continue;
                        }
                    }
                }
                None => active.events.recv().await,
            };
            match message {
                Some(message) => self.apply(message),
                None => self.fail(WORKER_ERROR.to_string()),
            }
        }
    }

    fn apply(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Event(event) => self.apply_event(event),
            WorkerMessage::Discard => {
                tracing::debug!(dropped = self.entries.len(), "discarding traced attempt");
                self.reset_output();
                self.trace_events.clear();
            }
            WorkerMessage::Fault(message) => {
                let message = if message.is_empty() {
                    WORKER_ERROR.to_string()
                } else {
                    message
                };
                self.fail(message);
            }
        }
    }

    fn apply_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Clear => self.reset_output(),
            OutputEvent::Group(label) => {
                let label = if label.is_truthy() {
                    label.coerce_to_string()
                } else {
                    DEFAULT_GROUP_LABEL.to_string()
                };
                self.append(EntryKind::Group, label);
                self.group_depth += 1;
            }
            OutputEvent::GroupEnd => {
                self.group_depth = self.group_depth.saturating_sub(1);
            }
            OutputEvent::Count { label, count } => {
                self.append(EntryKind::Count, format!("{label}: {count}"));
            }
            OutputEvent::Time { label, elapsed_ms } => {
                self.append(EntryKind::Time, format!("{label}: {elapsed_ms:.2}ms"));
            }
            OutputEvent::Trace { args, stack } => {
                let cleaned = if stack.is_empty() {
                    String::new()
                } else {
                    format_trace_stack(&stack)
                };
                let header = if args.is_empty() {
                    "Trace".to_string()
                } else {
                    format!("Trace: {}", format_output_args(&args))
                };
                let text = if cleaned.is_empty() {
                    header
                } else {
                    format!("{header}\n{cleaned}")
                };
                self.append(EntryKind::Trace, text);
            }
            OutputEvent::Assert(args) => {
                self.append(EntryKind::Assert, format_output_args(&args));
            }
            OutputEvent::Table(args) => {
                let text = match args.as_slice() {
                    [data] => build_table_output(data),
                    _ => format_output_args(&args),
                };
                self.append(EntryKind::Table, text);
            }
            OutputEvent::Log(args) => self.append(EntryKind::Log, format_output_args(&args)),
            OutputEvent::Info(args) => self.append(EntryKind::Info, format_output_args(&args)),
            OutputEvent::Warn(args) => self.append(EntryKind::Warn, format_output_args(&args)),
            OutputEvent::Error(args) => self.append(EntryKind::Error, format_output_args(&args)),
            OutputEvent::Viz(events) => self.trace_events = events,
            OutputEvent::VizStatus(status) => self.viz_status = status,
            OutputEvent::Done => self.complete(),
        }
    }

    fn append(&mut self, kind: EntryKind, text: String) {
        self.entries
            .push(OutputEntry::new(kind, text, self.group_depth));
    }

    fn complete(&mut self) {
        if let Some(started) = self.release_context() {
            self.record_summary(started);
        }
        self.state = RunState::Completed;
        tracing::debug!(entries = self.entries.len(), "run completed");
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(%message, "run failed");
        let started = self.release_context().unwrap_or_else(Instant::now);
        self.finish_failed(started, message);
    }

    fn finish_failed(&mut self, started: Instant, message: String) {
        self.append(EntryKind::Error, message);
        self.record_summary(started);
        self.state = RunState::Failed;
    }

    fn time_out(&mut self) {
        let millis = self
            .config
            .execution_timeout
            .map(|timeout| timeout.as_millis())
            .unwrap_or_default();
        self.fail(format!("Execution timed out after {millis}ms"));
    }

    fn record_summary(&mut self, started: Instant) {
        self.last_run = Some(RunSummary {
            finished_at: SystemTime::now(),
            duration: started.elapsed(),
        });
    }

    /// Terminate and drop the live context, returning when its run started.
    fn release_context(&mut self) -> Option<Instant> {
        let mut active = self.active.take()?;
        active.context.terminate();
        Some(active.started)
    }

    /// Clear entries and group depth. The live context, if any, keeps running.
    pub fn reset_output(&mut self) {
        self.group_depth = 0;
        self.entries.clear();
    }

    pub fn entries(&self) -> &[OutputEntry] {
        &self.entries
    }

    /// Entries visible under the current filters.
    pub fn filtered_entries(&self) -> Vec<&OutputEntry> {
        self.entries
            .iter()
            .filter(|entry| self.filters.allows(entry))
            .collect()
    }

    pub fn filters(&self) -> &OutputFilters {
        &self.filters
    }

    pub fn toggle_filter(&mut self, key: FilterKey) {
        self.filters.toggle(key);
    }

    pub fn set_filter(&mut self, key: FilterKey, enabled: bool) {
        self.filters.set(key, enabled);
    }

    pub fn trace_events(&self) -> &[TraceEvent] {
        &self.trace_events
    }

    pub fn visualization_status(&self) -> &VisualizationStatus {
        &self.viz_status
    }

    /// Text to show instead of a visualization, if any.
    pub fn visualization_note(&self) -> Option<&str> {
        visualization_note(&self.viz_status, &self.trace_events)
    }

    pub fn last_run(&self) -> Option<&RunSummary> {
        self.last_run.as_ref()
    }

    /// Current group nesting applied to new entries.
    pub fn group_depth(&self) -> usize {
        self.group_depth
    }
}

impl<S: ContextSpawner> Drop for Playground<S> {
    fn drop(&mut self) {
        self.release_context();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::event::EventSender;
    use crate::runtime::js_value::JsValue;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Replays one canned message script per spawned context.
    struct ScriptedSpawner {
        scripts: RefCell<VecDeque<Script>>,
        log: Log,
    }

    #[derive(Default)]
    struct Script {
        messages: Vec<WorkerMessage>,
        hang_up: bool,
    }

    impl Script {
        fn of(messages: Vec<WorkerMessage>) -> Self {
            Self {
                messages,
                hang_up: false,
            }
        }
    }

    struct ScriptedContext {
        id: usize,
        events: Option<EventSender>,
        script: Script,
        log: Log,
    }

    impl ScriptedSpawner {
        fn new(scripts: Vec<Script>) -> (Self, Log) {
            let log: Log = Rc::default();
            let spawner = Self {
                scripts: RefCell::new(scripts.into()),
                log: log.clone(),
            };
            (spawner, log)
        }
    }

    impl ContextSpawner for ScriptedSpawner {
        type Context = ScriptedContext;

        fn spawn(
            &self,
            _config: &SandboxConfig,
            events: EventSender,
        ) -> Result<ScriptedContext, PlaygroundError> {
            let script = self
                .scripts
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| PlaygroundError::Spawn("no script left".into()))?;
            let id = self.log.borrow().iter().filter(|l| l.starts_with("spawn")).count();
            self.log.borrow_mut().push(format!("spawn {id}"));
            Ok(ScriptedContext {
                id,
                events: Some(events),
                script,
                log: self.log.clone(),
            })
        }
    }

    impl ExecutionContext for ScriptedContext {
        fn post(&mut self, code: &str) -> Result<(), PlaygroundError> {
            self.log.borrow_mut().push(format!("post {} {code}", self.id));
            let events = self.events.as_ref().ok_or(PlaygroundError::Disconnected)?;
            for message in self.script.messages.drain(..) {
                let _ = events.send(message);
            }
            if self.script.hang_up {
                self.events = None;
            }
            Ok(())
        }

        fn terminate(&mut self) {
            self.log.borrow_mut().push(format!("terminate {}", self.id));
        }
    }

    fn ev(event: OutputEvent) -> WorkerMessage {
        WorkerMessage::Event(event)
    }

    fn log(text: &str) -> WorkerMessage {
        ev(OutputEvent::Log(vec![JsValue::string(text)]))
    }

    fn done() -> WorkerMessage {
        ev(OutputEvent::Done)
    }

    fn texts<S: ContextSpawner>(playground: &Playground<S>) -> Vec<(EntryKind, &str, usize)> {
        playground
            .entries()
            .iter()
            .map(|entry| (entry.kind, entry.text.as_str(), entry.depth))
            .collect()
    }

    fn playground(scripts: Vec<Script>) -> (Playground<ScriptedSpawner>, Log) {
        let (spawner, log) = ScriptedSpawner::new(scripts);
        (
            Playground::with_spawner(spawner, SandboxConfig::default()),
            log,
        )
    }

    #[test]
    fn test_completed_run_releases_context() {
        let (mut playground, log) = playground(vec![Script::of(vec![log("hi"), done()])]);
        playground.run("console.log('hi')").unwrap();
        assert_eq!(playground.state(), RunState::Running);

        assert!(!playground.poll());
        assert_eq!(playground.state(), RunState::Completed);
        assert_eq!(texts(&playground), vec![(EntryKind::Log, "hi", 0)]);
        assert!(playground.last_run().is_some());
        assert_eq!(
            *log.borrow(),
            vec!["spawn 0", "post 0 console.log('hi')", "terminate 0"]
        );
    }

    #[test]
    fn test_node_only_code_is_refused() {
        let (mut playground, log) = playground(vec![Script::default()]);
        assert!(playground.run_disabled("require('fs')"));
        assert_eq!(
            playground.run("const fs = require('fs')"),
            Err(PlaygroundError::NodeOnly("Uses require()".into()))
        );
        assert_eq!(playground.state(), RunState::Idle);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_run_refuses_while_running() {
        let (mut playground, _log) = playground(vec![Script::of(vec![log("slow")])]);
        playground.run("a()").unwrap();
        assert!(playground.poll());
        assert!(playground.run_disabled("b()"));
        assert_eq!(playground.run("b()"), Err(PlaygroundError::AlreadyRunning));
        assert_eq!(texts(&playground), vec![(EntryKind::Log, "slow", 0)]);
    }

    #[test]
    fn test_restart_is_single_flight() {
        let (mut playground, log) = playground(vec![
            Script::of(vec![log("first")]),
            Script::of(vec![log("second"), done()]),
        ]);
        playground.run("first()").unwrap();
        playground.restart("second()").unwrap();

        assert!(!playground.poll());
        assert_eq!(texts(&playground), vec![(EntryKind::Log, "second", 0)]);
        assert_eq!(playground.state(), RunState::Completed);
        assert_eq!(
            *log.borrow(),
            vec![
                "spawn 0",
                "post 0 first()",
                "terminate 0",
                "spawn 1",
                "post 1 second()",
                "terminate 1",
            ]
        );
    }

    #[test]
    fn test_group_depth_never_goes_negative() {
        let (mut playground, _log) = playground(vec![Script::of(vec![
            ev(OutputEvent::Group(JsValue::string("outer"))),
            log("inside"),
            ev(OutputEvent::GroupEnd),
            ev(OutputEvent::GroupEnd),
            log("after"),
            done(),
        ])]);
        playground.run("x()").unwrap();
        playground.poll();
        assert_eq!(
            texts(&playground),
            vec![
                (EntryKind::Group, "outer", 0),
                (EntryKind::Log, "inside", 1),
                (EntryKind::Log, "after", 0),
            ]
        );
        assert_eq!(playground.group_depth(), 0);
    }

    #[test]
    fn test_falsy_group_label_uses_default() {
        let (mut playground, _log) = playground(vec![Script::of(vec![
            ev(OutputEvent::Group(JsValue::string(""))),
            ev(OutputEvent::Group(JsValue::number(0.0))),
            done(),
        ])]);
        playground.run("x()").unwrap();
        playground.poll();
        assert_eq!(
            texts(&playground),
            vec![(EntryKind::Group, "Group", 0), (EntryKind::Group, "Group", 1)]
        );
    }

    #[test]
    fn test_event_rendering() {
        let (mut playground, _log) = playground(vec![Script::of(vec![
            ev(OutputEvent::Count {
                label: "clicks".into(),
                count: 3,
            }),
            ev(OutputEvent::Time {
                label: "load".into(),
                elapsed_ms: 1.234,
            }),
            ev(OutputEvent::Trace {
                args: vec![],
                stack: "Error\n    at foo (blob:http://x/1:2:3)".into(),
            }),
            ev(OutputEvent::Trace {
                args: vec![JsValue::string("here")],
                stack: String::new(),
            }),
            ev(OutputEvent::Assert(vec![JsValue::string("Assertion failed")])),
            ev(OutputEvent::Table(vec![JsValue::array(vec![])])),
            ev(OutputEvent::Table(vec![JsValue::string("a"), JsValue::string("b")])),
            ev(OutputEvent::Warn(vec![JsValue::string("careful")])),
            done(),
        ])]);
        playground.run("x()").unwrap();
        playground.poll();
        assert_eq!(
            texts(&playground),
            vec![
                (EntryKind::Count, "clicks: 3", 0),
                (EntryKind::Time, "load: 1.23ms", 0),
                (EntryKind::Trace, "Trace\nat foo", 0),
                (EntryKind::Trace, "Trace: here", 0),
                (EntryKind::Assert, "Assertion failed", 0),
                (EntryKind::Table, "[]", 0),
                (EntryKind::Table, "a b", 0),
                (EntryKind::Warn, "careful", 0),
            ]
        );
    }

    #[test]
    fn test_clear_discards_entries_and_depth() {
        let (mut playground, _log) = playground(vec![Script::of(vec![
            log("a"),
            ev(OutputEvent::Group(JsValue::string("g"))),
            ev(OutputEvent::Clear),
            log("b"),
            done(),
        ])]);
        playground.run("x()").unwrap();
        playground.poll();
        assert_eq!(texts(&playground), vec![(EntryKind::Log, "b", 0)]);
    }

    #[test]
    fn test_fault_fails_run() {
        let (mut playground, log) = playground(vec![Script::of(vec![
            log("partial"),
            WorkerMessage::Fault("Execution context ran out of memory".into()),
        ])]);
        playground.run("x()").unwrap();
        assert!(!playground.poll());
        assert_eq!(playground.state(), RunState::Failed);
        assert_eq!(
            texts(&playground),
            vec![
                (EntryKind::Log, "partial", 0),
                (EntryKind::Error, "Execution context ran out of memory", 0),
            ]
        );
        assert_eq!(log.borrow().last().map(String::as_str), Some("terminate 0"));
        // A failed run does not block the next one.
        assert!(!playground.run_disabled("x()"));
    }

    #[test]
    fn test_hang_up_reports_generic_error() {
        let (mut playground, _log) = playground(vec![Script {
            messages: vec![log("a")],
            hang_up: true,
        }]);
        playground.run("x()").unwrap();
        assert!(!playground.poll());
        assert_eq!(playground.state(), RunState::Failed);
        assert_eq!(
            playground.entries().last().map(|entry| entry.text.as_str()),
            Some("Worker error")
        );
    }

    #[test]
    fn test_spawn_failure_fails_run() {
        let (mut playground, _log) = playground(vec![]);
        let err = playground.run("x()").unwrap_err();
        assert!(matches!(err, PlaygroundError::Spawn(_)));
        assert_eq!(playground.state(), RunState::Failed);
        assert_eq!(playground.entries().len(), 1);
        assert_eq!(playground.entries()[0].kind, EntryKind::Error);
    }

    #[test]
    fn test_filters_are_non_destructive() {
        let (mut playground, _log) = playground(vec![Script::of(vec![
            log("l"),
            ev(OutputEvent::Warn(vec![JsValue::string("w")])),
            ev(OutputEvent::Group(JsValue::string("g"))),
            done(),
        ])]);
        playground.run("x()").unwrap();
        playground.poll();

        playground.toggle_filter(FilterKey::Warn);
        let visible: Vec<&str> = playground
            .filtered_entries()
            .iter()
            .map(|entry| entry.text.as_str())
            .collect();
        assert_eq!(visible, vec!["l", "g"]);
        assert_eq!(playground.entries().len(), 3);

        playground.toggle_filter(FilterKey::Warn);
        assert_eq!(playground.filtered_entries().len(), 3);
    }

    #[test]
    fn test_visualization_state_resets_per_run() {
        let trace = vec![
            TraceEvent { line: 1, time: 0, step: 1 },
            TraceEvent { line: 2, time: 0, step: 2 },
        ];
        let (mut playground, _log) = playground(vec![
            Script::of(vec![
                ev(OutputEvent::Viz(trace.clone())),
                ev(OutputEvent::VizStatus(VisualizationStatus::enabled())),
                done(),
            ]),
            Script::of(vec![]),
        ]);
        playground.run("a()").unwrap();
        playground.poll();
        assert_eq!(playground.trace_events(), trace.as_slice());
        assert_eq!(playground.visualization_note(), None);

        playground.run("b()").unwrap();
        assert!(playground.trace_events().is_empty());
        assert_eq!(playground.visualization_status(), &VisualizationStatus::default());
    }

    #[test]
    fn test_reset_output_keeps_context() {
        let (mut playground, log) = playground(vec![Script::of(vec![log("a")])]);
        playground.run("x()").unwrap();
        playground.poll();
        playground.reset_output();
        assert!(playground.entries().is_empty());
        assert_eq!(playground.state(), RunState::Running);
        assert!(!log.borrow().iter().any(|line| line.starts_with("terminate")));
    }

    #[test]
    fn test_drop_terminates_live_context() {
        let (mut playground, log) = playground(vec![Script::of(vec![])]);
        playground.run("x()").unwrap();
        drop(playground);
        assert_eq!(log.borrow().last().map(String::as_str), Some("terminate 0"));
    }

    #[test]
    fn test_poll_after_deadline_keeps_finished_run() {
        let (spawner, _log) = ScriptedSpawner::new(vec![Script::of(vec![log("hi"), done()])]);
        let config = SandboxConfig::new().with_execution_timeout(Duration::from_millis(10));
        let mut playground = Playground::with_spawner(spawner, config);
        playground.run("console.log('hi')").unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert!(!playground.poll());
        assert_eq!(playground.state(), RunState::Completed);
        assert_eq!(texts(&playground), vec![(EntryKind::Log, "hi", 0)]);
    }

    #[test]
    fn test_poll_after_deadline_times_out_unfinished_run() {
        let (spawner, log) = ScriptedSpawner::new(vec![Script::of(vec![log("start")])]);
        let config = SandboxConfig::new().with_execution_timeout(Duration::from_millis(10));
        let mut playground = Playground::with_spawner(spawner, config);
        playground.run("while (true) {}").unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert!(!playground.poll());
        assert_eq!(playground.state(), RunState::Failed);
        assert_eq!(
            texts(&playground),
            vec![
                (EntryKind::Log, "start", 0),
                (EntryKind::Error, "Execution timed out after 10ms", 0),
            ]
        );
        assert_eq!(log.borrow().last().map(String::as_str), Some("terminate 0"));
    }

    #[test]
    fn test_discard_drops_traced_attempt_output() {
        let (mut playground, _log) = playground(vec![Script::of(vec![
            ev(OutputEvent::Group(JsValue::string("g"))),
            log("before"),
            WorkerMessage::Discard,
            log("before"),
            ev(OutputEvent::Error(vec![JsValue::string("Error: boom")])),
            done(),
        ])]);
        playground.run("x()").unwrap();
        playground.poll();
        assert_eq!(
            texts(&playground),
            vec![
                (EntryKind::Log, "before", 0),
                (EntryKind::Error, "Error: boom", 0),
            ]
        );
        assert_eq!(playground.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_settle_applies_until_done() {
        let (mut playground, _log) = playground(vec![Script::of(vec![log("a"), done()])]);
        playground.run("x()").unwrap();
        playground.settle().await;
        assert_eq!(playground.state(), RunState::Completed);
        assert_eq!(texts(&playground), vec![(EntryKind::Log, "a", 0)]);
    }

    #[tokio::test]
    async fn test_settle_enforces_timeout() {
        let (spawner, log) = ScriptedSpawner::new(vec![Script::of(vec![log("a")])]);
        let config = SandboxConfig::new().with_execution_timeout(Duration::from_millis(50));
        let mut playground = Playground::with_spawner(spawner, config);
        playground.run("while (true) {}").unwrap();
        playground.settle().await;

        assert_eq!(playground.state(), RunState::Failed);
        assert_eq!(
            texts(&playground),
            vec![
                (EntryKind::Log, "a", 0),
                (EntryKind::Error, "Execution timed out after 50ms", 0),
            ]
        );
        assert_eq!(log.borrow().last().map(String::as_str), Some("terminate 0"));
    }

    #[tokio::test]
    async fn test_isolate_end_to_end() {
        let mut playground = Playground::default();
        playground
            .run("console.table([{item:'a',price:1},{item:'b',price:2}]);\nconsole.log('Total:', 3);")
            .unwrap();
        playground.settle().await;

        assert_eq!(playground.state(), RunState::Completed);
        let entries = playground.filtered_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Table);
        assert!(entries[0].text.starts_with("(index) | item | price"));
        assert_eq!(entries[0].text.lines().count(), 4);
        assert_eq!(entries[1].kind, EntryKind::Log);
        assert_eq!(entries[1].text, "Total: 3");
    }

    #[tokio::test]
    async fn test_isolate_restart_cancels_infinite_loop() {
        let mut playground = Playground::default();
        playground.run("while (true) {}").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        playground.restart("console.log('fresh');").unwrap();
        playground.settle().await;

        assert_eq!(playground.state(), RunState::Completed);
        let texts: Vec<&str> = playground
            .entries()
            .iter()
            .map(|entry| entry.text.as_str())
            .collect();
        assert_eq!(texts, vec!["fresh"]);
    }
}
