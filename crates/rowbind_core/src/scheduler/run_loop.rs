//! Run-loop scheduler confined to the creating thread.

use super::{run_task, Scheduler, SchedulerError, SchedulerId, Task};
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Maximum queued tasks per run loop.
const DEFAULT_CAPACITY: usize = 4096;

/// Longest single wait while pumping, so `run_until` re-checks its condition.
const PUMP_SLICE: Duration = Duration::from_millis(10);

struct LoopQueue {
    id: SchedulerId,
    thread: ThreadId,
    queue: Mutex<VecDeque<Task>>,
    ready: Condvar,
    pumped: AtomicBool,
    stopped: AtomicBool,
    capacity: usize,
}

impl LoopQueue {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped: Vec<Task> = self.queue.lock().drain(..).collect();
        if !dropped.is_empty() {
            tracing::warn!(
                scheduler = %self.id,
                count = dropped.len(),
                "run loop stopped with queued work; dropping it"
            );
        }
        drop(dropped);
        self.ready.notify_all();
    }
}

/// Marks the loop stopped when its thread exits.
struct LoopGuard(Arc<LoopQueue>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.stop();
    }
}

thread_local! {
    static CURRENT: RefCell<Option<LoopGuard>> = const { RefCell::new(None) };
}

/// Scheduler whose work runs on the thread that created it, whenever that
/// thread pumps the loop with [`RunLoopScheduler::run_pending`] or
/// [`RunLoopScheduler::run_until`].
///
/// Every thread has at most one live run loop; [`RunLoopScheduler::current`]
/// returns it.
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = RunLoopScheduler::current();
/// let session = Session::open(SessionConfig::new("app").scheduler(scheduler.clone()))?;
/// // ... later, on the same thread:
/// scheduler.run_pending()?;
/// ```
#[derive(Clone)]
pub struct RunLoopScheduler {
    inner: Arc<LoopQueue>,
}

impl RunLoopScheduler {
    /// Returns the run loop of the calling thread, creating it on first use
    /// or after the previous one was stopped.
    #[must_use]
    pub fn current() -> Arc<Self> {
        CURRENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(guard) = slot.as_ref() {
                if !guard.0.stopped.load(Ordering::Acquire) {
                    return Arc::new(Self {
                        inner: Arc::clone(&guard.0),
                    });
                }
            }
            let inner = Arc::new(LoopQueue {
                id: SchedulerId::next(),
                thread: thread::current().id(),
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                pumped: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                capacity: DEFAULT_CAPACITY,
            });
            tracing::trace!(scheduler = %inner.id, "created run loop");
            *slot = Some(LoopGuard(Arc::clone(&inner)));
            Arc::new(Self { inner })
        })
    }

    /// Runs the work queued so far. Work queued while running waits for the
    /// next call. Returns the number of tasks run.
    pub fn run_pending(&self) -> Result<usize, SchedulerError> {
        if !self.is_on_thread() {
            return Err(SchedulerError::WrongThread);
        }
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::Stopped);
        }
        self.inner.pumped.store(true, Ordering::Release);
        let batch: Vec<Task> = self.inner.queue.lock().drain(..).collect();
        let count = batch.len();
        for task in batch {
            run_task(task);
        }
        Ok(count)
    }

    /// Pumps the loop until `done` returns true or `timeout` elapses.
    /// Returns whether `done` became true.
    pub fn run_until(
        &self,
        mut done: impl FnMut() -> bool,
        timeout: Duration,
    ) -> Result<bool, SchedulerError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending()?;
            if done() {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let mut queue = self.inner.queue.lock();
            if queue.is_empty() {
                let slice = (deadline - now).min(PUMP_SLICE);
                self.inner.ready.wait_for(&mut queue, slice);
            }
        }
    }

    /// Stops the loop. Queued work is dropped and later `invoke` calls fail
    /// with [`SchedulerError::Stopped`].
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }
}

impl Scheduler for RunLoopScheduler {
    fn invoke(&self, task: Task) -> Result<(), SchedulerError> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::Stopped);
        }
        let mut queue = self.inner.queue.lock();
        if queue.len() >= self.inner.capacity {
            return Err(SchedulerError::QueueFull {
                capacity: self.inner.capacity,
            });
        }
        queue.push_back(task);
        drop(queue);
        self.inner.ready.notify_one();
        Ok(())
    }

    fn is_on_thread(&self) -> bool {
        thread::current().id() == self.inner.thread
    }

    fn can_invoke(&self) -> bool {
        self.inner.pumped.load(Ordering::Acquire) && !self.inner.stopped.load(Ordering::Acquire)
    }

    fn id(&self) -> SchedulerId {
        self.inner.id
    }
}

impl std::fmt::Debug for RunLoopScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopScheduler")
            .field("id", &self.inner.id)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn current_is_per_thread() {
        let here = RunLoopScheduler::current();
        let again = RunLoopScheduler::current();
        assert!(here.is_same_as(&*again));
        assert!(here.is_on_thread());

        let there = thread::spawn(|| RunLoopScheduler::current().id())
            .join()
            .unwrap();
        assert_ne!(there, here.id());
    }

    #[test]
    fn work_runs_when_pumped_in_fifo_order() {
        let scheduler = RunLoopScheduler::current();
        assert!(!scheduler.can_invoke());
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            scheduler.invoke(Box::new(move || order.lock().push(i))).unwrap();
        }
        assert!(order.lock().is_empty());
        assert_eq!(scheduler.run_pending().unwrap(), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(scheduler.can_invoke());
    }

    #[test]
    fn invoke_from_another_thread() {
        let scheduler = RunLoopScheduler::current();
        let hits = Arc::new(AtomicUsize::new(0));
        let remote = Arc::clone(&scheduler);
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            assert!(!remote.is_on_thread());
            remote
                .invoke(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        })
        .join()
        .unwrap();

        let done = scheduler
            .run_until(|| hits.load(Ordering::SeqCst) == 1, Duration::from_secs(5))
            .unwrap();
        assert!(done);
    }

    #[test]
    fn pumping_off_thread_fails() {
        let scheduler = RunLoopScheduler::current();
        let remote = Arc::clone(&scheduler);
        let result = thread::spawn(move || remote.run_pending()).join().unwrap();
        assert_eq!(result, Err(SchedulerError::WrongThread));
    }

    #[test]
    fn stopped_loop_rejects_work() {
        let scheduler = RunLoopScheduler::current();
        scheduler.invoke(Box::new(|| {})).unwrap();
        scheduler.stop();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(
            scheduler.invoke(Box::new(|| {})),
            Err(SchedulerError::Stopped)
        );
        assert!(!scheduler.can_invoke());

        let fresh = RunLoopScheduler::current();
        assert!(!fresh.is_same_as(&*scheduler));
    }

    #[test]
    fn loop_stops_when_thread_exits() {
        let scheduler = thread::spawn(RunLoopScheduler::current).join().unwrap();
        assert_eq!(
            scheduler.invoke(Box::new(|| {})),
            Err(SchedulerError::Stopped)
        );
    }

    #[test]
    fn run_until_times_out() {
        let scheduler = RunLoopScheduler::current();
        let done = scheduler
            .run_until(|| false, Duration::from_millis(30))
            .unwrap();
        assert!(!done);
    }
}
