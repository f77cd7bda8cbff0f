//! Isolated execution of playground snippets.
//!
//! Each execution context owns a single V8 isolate (via `deno_core`) running
//! on a dedicated OS thread with a Tokio event loop. The isolate has no host
//! APIs: the only bridge out is a pair of ops used by the console shim and
//! the trace callback. Results stream back over an unbounded channel.

pub mod config;
pub mod console;
pub mod event;
pub mod handle;
pub mod js_value;
pub mod runner;

/// Prefix of every script name the sandbox evaluates. Stack frames carrying
/// it belong to the sandbox, not to the snippet.
pub const SANDBOX_ORIGIN: &str = "playground:";

// Re-export key types for convenience
pub use config::SandboxConfig;
pub use event::{event_channel, EventReceiver, EventSender, OutputEvent, WorkerMessage};
pub use handle::{ContextSpawner, ExecutionContext, IsolateSpawner, WorkerHandle};
pub use js_value::JsValue;
pub use runner::OUT_OF_MEMORY;
