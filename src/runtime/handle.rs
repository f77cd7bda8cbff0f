//! Owner-side handle for a sandbox thread, and the seam the orchestrator
//! spawns contexts through.

use crate::error::PlaygroundError;
use crate::runtime::config::SandboxConfig;
use crate::runtime::event::EventSender;
use crate::runtime::runner::{spawn_worker_thread, TerminationHandle, WorkerCommand};
use tokio::sync::mpsc as async_mpsc;

/// A live, isolated execution context.
pub trait ExecutionContext {
    /// Submit a snippet. Output arrives on the context's event channel.
    fn post(&mut self, code: &str) -> Result<(), PlaygroundError>;

    /// Tear the context down immediately. Idempotent.
    fn terminate(&mut self);
}

/// Creates execution contexts.
pub trait ContextSpawner {
    type Context: ExecutionContext;

    fn spawn(
        &self,
        config: &SandboxConfig,
        events: EventSender,
    ) -> Result<Self::Context, PlaygroundError>;
}

/// Spawns one V8 isolate per context.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsolateSpawner;

impl ContextSpawner for IsolateSpawner {
    type Context = WorkerHandle;

    fn spawn(
        &self,
        config: &SandboxConfig,
        events: EventSender,
    ) -> Result<WorkerHandle, PlaygroundError> {
        WorkerHandle::spawn(config.clone(), events)
    }
}

/// Handle to a sandbox thread. Dropping it terminates the isolate.
pub struct WorkerHandle {
    tx: Option<async_mpsc::UnboundedSender<WorkerCommand>>,
    termination: TerminationHandle,
}

impl WorkerHandle {
    pub fn spawn(config: SandboxConfig, events: EventSender) -> Result<Self, PlaygroundError> {
        let (tx, termination) = spawn_worker_thread(config, events)?;
        Ok(Self {
            tx: Some(tx),
            termination,
        })
    }

    fn sender(&self) -> Result<&async_mpsc::UnboundedSender<WorkerCommand>, PlaygroundError> {
        self.tx.as_ref().ok_or(PlaygroundError::Disconnected)
    }

    pub fn execute(&self, code: &str) -> Result<(), PlaygroundError> {
        self.sender()?
            .send(WorkerCommand::Execute {
                code: code.to_string(),
            })
            .map_err(|_| PlaygroundError::Disconnected)
    }

    pub fn is_terminated(&self) -> bool {
        self.tx.is_none() || self.termination.is_terminated()
    }

    pub fn terminate(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::debug!("terminating sandbox isolate");
            self.termination.terminate();
            let _ = tx.send(WorkerCommand::Shutdown);
        }
    }
}

impl ExecutionContext for WorkerHandle {
    fn post(&mut self, code: &str) -> Result<(), PlaygroundError> {
        self.execute(code)
    }

    fn terminate(&mut self) {
        WorkerHandle::terminate(self);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        WorkerHandle::terminate(self);
    }
}
