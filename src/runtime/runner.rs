//! Sandbox thread backed by `deno_core::JsRuntime`.
//!
//! This module hosts one V8 isolate on a dedicated OS thread with a
//! single-threaded Tokio runtime. Snippets are forwarded through
//! [`WorkerCommand`] and executed sequentially on that thread; everything
//! the snippet prints comes back as [`WorkerMessage`]s.

use crate::error::PlaygroundError;
use crate::instrument::instrument_code;
use crate::runtime::config::SandboxConfig;
use crate::runtime::console::{playground_sandbox, ConsoleShim};
use crate::runtime::event::{EventSender, OutputEvent, WorkerMessage};
use crate::trace::{
    TraceEvent, TraceRecorder, VisualizationStatus, VIZ_DISABLED, VIZ_SKIPPED, VIZ_TURNED_OFF,
};
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver as StdReceiver;
use std::sync::mpsc::Sender as StdSender;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Fault reported when the isolate hits its heap limit.
pub const OUT_OF_MEMORY: &str = "Execution context ran out of memory";

pub(crate) const BOOTSTRAP_SCRIPT: &str = "playground:sandbox";

const SANDBOX_BOOTSTRAP: &str = include_str!("sandbox.js");

type InitSignalChannel = (
    StdSender<Result<TerminationHandle, String>>,
    StdReceiver<Result<TerminationHandle, String>>,
);

/// Stops a sandbox isolate from any thread.
#[derive(Debug)]
pub struct TerminationHandle {
    isolate: v8::IsolateHandle,
    cancelled: Arc<AtomicBool>,
}

impl TerminationHandle {
    /// Interrupt whatever the isolate is running. The worker stops without
    /// reporting a fault.
    pub fn terminate(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.isolate.terminate_execution();
    }

    pub fn is_terminated(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Commands sent to the sandbox thread.
#[derive(Debug)]
pub enum WorkerCommand {
    Execute { code: String },
    Shutdown,
}

/// Why a run stopped before reaching `done`.
#[derive(Debug)]
enum Abort {
    /// The owner dropped the event receiver.
    Closed,
    /// The execution context itself failed.
    Fault(String),
}

/// Outcome of running the compiled snippet once.
struct Attempt {
    error: Option<String>,
    trace: Vec<TraceEvent>,
}

/// The bootstrap's entry points. They are returned by the bootstrap script
/// instead of being installed on `globalThis`, so snippets cannot reach them.
struct SandboxHooks {
    compile: v8::Global<v8::Function>,
    invoke: v8::Global<v8::Function>,
}

#[derive(Clone, Copy)]
enum Hook {
    Compile,
    Invoke,
}

/// Spawn a sandbox thread and wait for its isolate to come up.
///
/// Returns the command sender and a handle that can terminate the isolate
/// from any thread.
pub fn spawn_worker_thread(
    config: SandboxConfig,
    events: EventSender,
) -> Result<(mpsc::UnboundedSender<WorkerCommand>, TerminationHandle), PlaygroundError> {
    config.validate()?;

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WorkerCommand>();
    let (init_tx, init_rx): InitSignalChannel = std::sync::mpsc::channel();

    std::thread::Builder::new()
        .name("playground-sandbox".to_string())
        .spawn(move || {
            let tokio_rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    let _ = init_tx.send(Err(format!("failed to build tokio runtime: {err}")));
                    return;
                }
            };

            let mut core = match SandboxCore::new(&config, events) {
                Ok(mut core) => {
                    let _ = init_tx.send(Ok(core.termination_handle()));
                    core
                }
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            tokio_rt.block_on(async move {
                core.run(cmd_rx).await;
            });
        })
        .map_err(|e| PlaygroundError::Spawn(format!("failed to spawn sandbox thread: {e}")))?;

    match init_rx.recv() {
        Ok(Ok(termination)) => Ok((cmd_tx, termination)),
        Ok(Err(err)) => Err(PlaygroundError::Spawn(err)),
        Err(_) => Err(PlaygroundError::Spawn(
            "sandbox thread initialization failed".to_string(),
        )),
    }
}

struct SandboxCore {
    js_runtime: JsRuntime,
    hooks: SandboxHooks,
    events: EventSender,
    instrument: bool,
    out_of_memory: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl SandboxCore {
    fn new(config: &SandboxConfig, events: EventSender) -> Result<Self, String> {
        let create_params = config
            .heap_limits()
            .map(|(initial, max)| v8::CreateParams::default().heap_limits(initial, max));
        let has_heap_limit = create_params.is_some();

        let mut js_runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![playground_sandbox::init()],
            create_params,
            ..Default::default()
        });

        let out_of_memory = Arc::new(AtomicBool::new(false));
        if has_heap_limit {
            let isolate = js_runtime.v8_isolate().thread_safe_handle();
            let flag = out_of_memory.clone();
            js_runtime.add_near_heap_limit_callback(move |current, _initial| {
                flag.store(true, Ordering::SeqCst);
                isolate.terminate_execution();
                // Headroom so the termination can unwind.
                current * 2
            });
        }

        let exported = js_runtime
            .execute_script(BOOTSTRAP_SCRIPT, SANDBOX_BOOTSTRAP.to_string())
            .map_err(|err| err.to_string())?;
        let hooks = {
            let scope = &mut js_runtime.handle_scope();
            let exported = v8::Local::new(scope, exported);
            let exported = v8::Local::<v8::Object>::try_from(exported)
                .map_err(|_| "sandbox bootstrap did not return its hooks".to_string())?;
            SandboxHooks {
                compile: hook_function(scope, exported, "compile")?,
                invoke: hook_function(scope, exported, "invoke")?,
            }
        };

        Ok(Self {
            js_runtime,
            hooks,
            events,
            instrument: config.instrument,
            out_of_memory,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    fn termination_handle(&mut self) -> TerminationHandle {
        TerminationHandle {
            isolate: self.js_runtime.v8_isolate().thread_safe_handle(),
            cancelled: self.cancelled.clone(),
        }
    }

    async fn run(&mut self, mut rx: mpsc::UnboundedReceiver<WorkerCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                WorkerCommand::Execute { code } => match self.execute(&code).await {
                    Ok(()) => {}
                    Err(Abort::Closed) => {
                        tracing::debug!("run abandoned by its owner");
                        break;
                    }
                    Err(Abort::Fault(message)) => {
                        tracing::warn!(%message, "execution context faulted");
                        let _ = self.events.send(WorkerMessage::Fault(message));
                        break;
                    }
                },
                WorkerCommand::Shutdown => break,
            }
        }
    }

    async fn execute(&mut self, code: &str) -> Result<(), Abort> {
        let mut status = VisualizationStatus::disabled(VIZ_TURNED_OFF);
        let mut traced = false;

        if self.instrument {
            match self.compile(&instrument_code(code))? {
                None => {
                    traced = true;
                    status = VisualizationStatus::enabled();
                }
                Some(reason) => {
                    tracing::debug!(%reason, "instrumented source does not compile");
                    status = VisualizationStatus::disabled(VIZ_SKIPPED);
                }
            }
        }

        if !traced {
            if let Some(message) = self.compile(code)? {
                self.emit(OutputEvent::error_text(message));
                self.finish(status);
                return Ok(());
            }
        }

        let first = self.attempt(traced).await?;
        let error = if !traced {
            first.error
        } else if first.error.is_none() {
            if !first.trace.is_empty() {
                self.emit(OutputEvent::Viz(first.trace));
            }
            None
        } else {
            tracing::debug!("instrumented run threw, rerunning raw source");
            status = VisualizationStatus::disabled(VIZ_DISABLED);
            match self.compile(code)? {
                None => {
                    let _ = self.events.send(WorkerMessage::Discard);
                    self.attempt(false).await?.error
                }
                Some(_) => first.error,
            }
        };

        if let Some(message) = error {
            self.emit(OutputEvent::error_text(message));
        }
        self.finish(status);
        Ok(())
    }

    /// Compile `source` into the sandbox's pending function. Returns the
    /// compile error text, if any.
    fn compile(&mut self, source: &str) -> Result<Option<String>, Abort> {
        self.call_hook(Hook::Compile, Some(source))
    }

    /// Run the compiled function once with a fresh console.
    ///
    /// Output streams to the owner as it happens, traced or not; the caller
    /// retracts a traced attempt that threw with [`WorkerMessage::Discard`].
    async fn attempt(&mut self, traced: bool) -> Result<Attempt, Abort> {
        {
            let op_state = self.js_runtime.op_state();
            let mut state = op_state.borrow_mut();
            state.put(ConsoleShim::new(self.events.clone()));
            if traced {
                state.put(TraceRecorder::new());
            } else {
                state.try_take::<TraceRecorder>();
            }
        }

        let mut error = self.call_hook(Hook::Invoke, None)?;

        // Settle promise callbacks queued by the snippet.
        if let Err(err) = self
            .js_runtime
            .run_event_loop(PollEventLoopOptions::default())
            .await
        {
            if let Some(abort) = self.interrupted() {
                return Err(abort);
            }
            if error.is_none() {
                error = Some(err.to_string());
            }
        }

        let trace = {
            let op_state = self.js_runtime.op_state();
            let mut state = op_state.borrow_mut();
            state.try_take::<ConsoleShim>();
            match state.try_take::<TraceRecorder>() {
                Some(recorder) => {
                    if recorder.dropped() > 0 {
                        tracing::debug!(dropped = recorder.dropped(), "trace event cap reached");
                    }
                    recorder.into_events()
                }
                None => Vec::new(),
            }
        };

        if let Some(abort) = self.interrupted() {
            return Err(abort);
        }

        Ok(Attempt { error, trace })
    }

    /// Call one of the bootstrap's entry points. They catch everything the
    /// snippet throws and return `null` or the error text, so a failed call
    /// means the isolate itself was interrupted.
    fn call_hook(&mut self, hook: Hook, source: Option<&str>) -> Result<Option<String>, Abort> {
        let function = match hook {
            Hook::Compile => &self.hooks.compile,
            Hook::Invoke => &self.hooks.invoke,
        };

        let outcome = {
            let scope = &mut self.js_runtime.handle_scope();
            let tc = &mut v8::TryCatch::new(scope);
            let function = v8::Local::new(tc, function);
            let receiver: v8::Local<v8::Value> = v8::undefined(tc).into();
            let args: Vec<v8::Local<v8::Value>> = match source {
                Some(source) => match v8::String::new(tc, source) {
                    Some(text) => vec![text.into()],
                    None => return Err(Abort::Fault("snippet is too large to load".to_string())),
                },
                None => Vec::new(),
            };

            match function.call(tc, receiver, &args) {
                Some(value) => deno_core::serde_v8::from_v8::<Option<String>>(tc, value)
                    .map_err(|err| format!("unexpected sandbox result: {err}")),
                None => Err(tc
                    .exception()
                    .map(|exception| exception.to_rust_string_lossy(tc))
                    .unwrap_or_else(|| "sandbox call failed".to_string())),
            }
        };

        outcome.map_err(|message| self.interrupted().unwrap_or(Abort::Fault(message)))
    }

    /// Whether the run was cut short from outside the script.
    fn interrupted(&self) -> Option<Abort> {
        if self.out_of_memory.load(Ordering::SeqCst) {
            return Some(Abort::Fault(OUT_OF_MEMORY.to_string()));
        }
        if self.cancelled.load(Ordering::SeqCst) || self.events.is_closed() {
            return Some(Abort::Closed);
        }
        None
    }

    fn emit(&self, event: OutputEvent) {
        let _ = self.events.send(WorkerMessage::Event(event));
    }

    fn finish(&self, status: VisualizationStatus) {
        self.emit(OutputEvent::VizStatus(status));
        self.emit(OutputEvent::Done);
    }
}

fn hook_function<'s>(
    scope: &mut v8::HandleScope<'s>,
    exported: v8::Local<'s, v8::Object>,
    name: &str,
) -> Result<v8::Global<v8::Function>, String> {
    let key = v8::String::new(scope, name).ok_or_else(|| format!("cannot allocate {name}"))?;
    let value = exported
        .get(scope, key.into())
        .ok_or_else(|| format!("sandbox hook {name} is missing"))?;
    let function = v8::Local::<v8::Function>::try_from(value)
        .map_err(|_| format!("sandbox hook {name} is not a function"))?;
    Ok(v8::Global::new(scope, function))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SANDBOX_ORIGIN;

    #[test]
    fn test_bootstrap_carries_sandbox_origin() {
        assert!(BOOTSTRAP_SCRIPT.starts_with(SANDBOX_ORIGIN));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_spawn() {
        let (events, _rx) = crate::runtime::event::event_channel();
        let config = SandboxConfig::new().with_initial_heap_size(1024);
        let err = spawn_worker_thread(config, events).unwrap_err();
        assert!(matches!(err, PlaygroundError::InvalidConfig(_)));
    }
}
