//! Scheduler backed by a dedicated worker thread.

use super::{run_task, Scheduler, SchedulerError, SchedulerId, Task};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// Configuration for thread-backed schedulers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSchedulerConfig {
    /// Maximum queued tasks before `invoke` reports `QueueFull`.
    pub capacity: usize,
    /// Worker thread name.
    pub name: String,
}

impl Default for ThreadSchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            name: "rowbind-scheduler".to_string(),
        }
    }
}

impl ThreadSchedulerConfig {
    /// Sets the queue capacity. Zero is treated as one.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the worker thread name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Generic scheduler: one worker thread draining a bounded FIFO queue.
///
/// Sessions confined to a `ThreadScheduler` must be used from inside tasks
/// it runs.
pub struct ThreadScheduler {
    id: SchedulerId,
    sender: Mutex<Option<SyncSender<Task>>>,
    capacity: usize,
    thread: ThreadId,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadScheduler {
    /// Starts the worker thread.
    pub fn spawn(config: ThreadSchedulerConfig) -> Result<Arc<Self>, SchedulerError> {
        let capacity = config.capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Task>(capacity);
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let id = SchedulerId::next();

        let handle = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    run_task(task);
                }
                worker_running.store(false, Ordering::Release);
                tracing::debug!(scheduler = %id, "scheduler thread exiting");
            })
            .map_err(|e| SchedulerError::spawn(e.to_string()))?;

        tracing::debug!(scheduler = %id, name = %config.name, capacity, "started scheduler thread");
        Ok(Arc::new(Self {
            id,
            sender: Mutex::new(Some(sender)),
            capacity,
            thread: handle.thread().id(),
            running,
            handle: Mutex::new(Some(handle)),
        }))
    }

    /// Stops accepting work, lets the worker drain what was accepted, and
    /// waits for it unless called from the worker itself.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if self.is_on_thread() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!(scheduler = %self.id, "scheduler thread panicked");
            }
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn invoke(&self, task: Task) -> Result<(), SchedulerError> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(SchedulerError::Stopped);
        };
        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SchedulerError::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(SchedulerError::Stopped),
        }
    }

    fn is_on_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    fn can_invoke(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.sender.lock().is_some()
    }

    fn id(&self) -> SchedulerId {
        self.id
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn runs_work_on_worker_thread() {
        let scheduler = ThreadScheduler::spawn(ThreadSchedulerConfig::default()).unwrap();
        assert!(!scheduler.is_on_thread());
        assert!(scheduler.can_invoke());

        let (tx, rx) = channel();
        let remote = Arc::clone(&scheduler);
        scheduler
            .invoke(Box::new(move || {
                tx.send(remote.is_on_thread()).unwrap();
            }))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn fifo_per_caller() {
        let scheduler = ThreadScheduler::spawn(ThreadSchedulerConfig::default()).unwrap();
        let (tx, rx) = channel();
        for i in 0..50 {
            let tx = tx.clone();
            scheduler.invoke(Box::new(move || tx.send(i).unwrap())).unwrap();
        }
        let seen: Vec<i32> = (0..50)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn full_queue_is_reported() {
        let scheduler =
            ThreadScheduler::spawn(ThreadSchedulerConfig::default().capacity(1)).unwrap();
        let (gate_tx, gate_rx) = channel::<()>();
        let (started_tx, started_rx) = channel::<()>();
        scheduler
            .invoke(Box::new(move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        scheduler.invoke(Box::new(|| {})).unwrap();
        assert_eq!(
            scheduler.invoke(Box::new(|| {})),
            Err(SchedulerError::QueueFull { capacity: 1 })
        );
        gate_tx.send(()).unwrap();
    }

    #[test]
    fn shutdown_drains_accepted_work() {
        let scheduler = ThreadScheduler::spawn(ThreadSchedulerConfig::default()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let hits = Arc::clone(&hits);
            scheduler
                .invoke(Box::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        scheduler.shutdown();
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(scheduler.invoke(Box::new(|| {})), Err(SchedulerError::Stopped));
        assert!(!scheduler.can_invoke());
    }

    #[test]
    fn panicking_task_does_not_stop_worker() {
        let scheduler = ThreadScheduler::spawn(ThreadSchedulerConfig::default()).unwrap();
        scheduler.invoke(Box::new(|| panic!("task failure"))).unwrap();
        let (tx, rx) = channel();
        scheduler.invoke(Box::new(move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
