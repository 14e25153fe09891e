//! Thread-confinement schedulers.
//!
//! A [`Scheduler`] models the thread or event loop a session is confined
//! to and queues work onto it. Three implementations are provided:
//!
//! - [`RunLoopScheduler`]: confined to the thread that created it and
//!   executed when that thread pumps its loop.
//! - [`ThreadScheduler`]: a dedicated worker thread with a bounded queue.
//! - `TokioScheduler`: a current-thread tokio runtime on a dedicated thread
//!   (requires the `tokio` feature).
//!
//! # Backpressure
//!
//! [`Scheduler::invoke`] never blocks and never drops work silently. A full
//! queue returns [`SchedulerError::QueueFull`] and a stopped scheduler
//! returns [`SchedulerError::Stopped`]. Work accepted by a thread-backed
//! scheduler is drained before its thread exits. Work accepted by a run loop
//! stays queued until the loop is pumped and is dropped, with a warning,
//! only when the loop is stopped or its thread ends.

mod default;
#[cfg(feature = "tokio")]
mod reactor;
mod run_loop;
mod thread;

pub use default::{
    make_default, make_platform_default, reset_default_factory, set_default_factory,
    SchedulerFactory,
};
#[cfg(feature = "tokio")]
pub use reactor::TokioScheduler;
pub use run_loop::RunLoopScheduler;
pub use thread::{ThreadScheduler, ThreadSchedulerConfig};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// A unit of work queued onto a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned when work cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The queue is at capacity.
    #[error("scheduler queue is full (capacity {capacity})")]
    QueueFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// The scheduler no longer accepts work.
    #[error("scheduler is stopped")]
    Stopped,

    /// The scheduler cannot perform the operation.
    #[error("unsupported scheduler operation: {message}")]
    Unsupported {
        /// What was attempted.
        message: String,
    },

    /// The scheduler thread could not be started.
    #[error("failed to start scheduler thread: {message}")]
    Spawn {
        /// Underlying failure.
        message: String,
    },

    /// A thread-confined operation was called from another thread.
    #[error("scheduler accessed from a thread it is not confined to")]
    WrongThread,
}

impl SchedulerError {
    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a spawn error.
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn {
            message: message.into(),
        }
    }
}

/// Process-unique scheduler identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchedulerId(u64);

impl SchedulerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler:{}", self.0)
    }
}

/// The thread or event loop a session is confined to.
pub trait Scheduler: Send + Sync {
    /// Queues `task` for execution on the owning thread. Callable from any
    /// thread. Tasks queued from one thread run in FIFO order.
    fn invoke(&self, task: Task) -> Result<(), SchedulerError>;

    /// Returns true iff called from the owning thread.
    fn is_on_thread(&self) -> bool;

    /// Returns true only if both schedulers dispatch to the same thread.
    fn is_same_as(&self, other: &dyn Scheduler) -> bool {
        self.id() == other.id()
    }

    /// Returns false while queued work cannot currently be executed, for
    /// example before a run loop is first pumped or after it stopped.
    fn can_invoke(&self) -> bool;

    /// Identity of this scheduler.
    fn id(&self) -> SchedulerId;
}

impl fmt::Debug for dyn Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.id())
            .field("can_invoke", &self.can_invoke())
            .finish()
    }
}

/// Runs one task, isolating a panic from the scheduler loop.
pub(crate) fn run_task(task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::warn!("scheduled task panicked; continuing with the next task");
    }
}
