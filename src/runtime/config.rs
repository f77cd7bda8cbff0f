//! Sandbox configuration for one execution context.
//!
//! This module defines the limits applied to the isolate that runs a snippet
//! and the switches that shape a run.

use crate::error::PlaygroundError;
use std::time::Duration;

/// Configuration for a single sandboxed isolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Maximum heap size in bytes (None = V8 default)
    pub max_heap_size: Option<usize>,

    /// Initial heap size in bytes (None = V8 default)
    pub initial_heap_size: Option<usize>,

    /// Optional watchdog for a whole run, enforced by the owner of the context
    pub execution_timeout: Option<Duration>,

    /// Inject trace callbacks before running (default: true)
    pub instrument: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_heap_size: None,
            initial_heap_size: None,
            execution_timeout: None,
            instrument: true,
        }
    }
}

impl SandboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_heap_size(mut self, bytes: usize) -> Self {
        self.max_heap_size = Some(bytes);
        self
    }

    pub fn with_initial_heap_size(mut self, bytes: usize) -> Self {
        self.initial_heap_size = Some(bytes);
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn with_instrumentation(mut self, enabled: bool) -> Self {
        self.instrument = enabled;
        self
    }

    /// Check heap limits for consistency.
    pub fn validate(&self) -> Result<(), PlaygroundError> {
        if self.initial_heap_size.is_some() && self.max_heap_size.is_none() {
            return Err(PlaygroundError::InvalidConfig(
                "initial_heap_size requires max_heap_size to be set as well".to_string(),
            ));
        }

        if let (Some(initial), Some(max)) = (self.initial_heap_size, self.max_heap_size) {
            if initial > max {
                return Err(PlaygroundError::InvalidConfig(format!(
                    "initial_heap_size ({}) cannot exceed max_heap_size ({})",
                    initial, max
                )));
            }
        }

        if self.execution_timeout == Some(Duration::ZERO) {
            return Err(PlaygroundError::InvalidConfig(
                "execution_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// `(initial, max)` heap limits to hand to V8, if any.
    pub(crate) fn heap_limits(&self) -> Option<(usize, usize)> {
        self.max_heap_size
            .map(|max| (self.initial_heap_size.unwrap_or(0), max))
    }
}
