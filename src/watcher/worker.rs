//! Worker capability and logger sink used by signal routers.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use super::Event;

/// Outcome of [`Worker::work`] other than success.
#[derive(Error, Debug)]
pub enum WorkError {
    /// The worker is still waiting for its completing event.
    #[error("worker is waiting for a trigger event")]
    NotReady,

    #[error("worker failed: {0}")]
    Failed(#[source] Box<dyn StdError + Send + Sync>),
}

impl WorkError {
    /// Wrap any error as a hard failure.
    pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        WorkError::Failed(err.into())
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, WorkError::NotReady)
    }
}

/// A stateful task bound to one filename.
///
/// Routers feed events with [`open`](Worker::open) and run the task with
/// [`work`](Worker::work). In accumulating mode the answer of the first
/// `open` decides whether the worker is kept for later events; afterwards the
/// return value is ignored.
pub trait Worker: Send {
    /// Load the latest event. Return `false` when the event is not an
    /// initiator worth tracking.
    fn open(&mut self, event: &Event) -> bool;

    /// Execute the accumulated task.
    fn work(&mut self) -> Result<(), WorkError>;
}

/// Produces a fresh worker for each new event or filename.
pub type WorkerFactory = Arc<dyn Fn() -> Box<dyn Worker> + Send + Sync>;

/// Sink for non-fatal failure messages.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
}

impl<F> Logger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Forwards failure messages to `tracing` at error level.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    component: String,
}

impl TracingLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new("filemon")
    }
}

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::error!("[{}] {message}", self.component);
    }
}
