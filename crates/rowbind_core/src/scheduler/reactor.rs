//! Reactor-based scheduler: a current-thread tokio runtime on its own thread.

use super::{run_task, Scheduler, SchedulerError, SchedulerId, Task, ThreadSchedulerConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Scheduler driving a current-thread tokio runtime.
///
/// Queued tasks run on the runtime thread between its async tasks; futures
/// spawned through [`TokioScheduler::handle`] share that thread.
pub struct TokioScheduler {
    id: SchedulerId,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    capacity: usize,
    thread: ThreadId,
    runtime: Handle,
    running: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Starts the runtime thread.
    pub fn spawn(config: ThreadSchedulerConfig) -> Result<Arc<Self>, SchedulerError> {
        let capacity = config.capacity.max(1);
        let (sender, mut receiver) = mpsc::channel::<Task>(capacity);
        let (handle_tx, handle_rx) = std_mpsc::sync_channel::<Result<Handle, String>>(1);
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let id = SchedulerId::next();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        worker_running.store(false, Ordering::Release);
                        let _ = handle_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async move {
                    while let Some(task) = receiver.recv().await {
                        run_task(task);
                        tokio::task::yield_now().await;
                    }
                });
                worker_running.store(false, Ordering::Release);
                tracing::debug!(scheduler = %id, "runtime thread exiting");
            })
            .map_err(|e| SchedulerError::spawn(e.to_string()))?;

        let runtime = handle_rx
            .recv()
            .map_err(|e| SchedulerError::spawn(e.to_string()))?
            .map_err(SchedulerError::spawn)?;

        tracing::debug!(scheduler = %id, name = %config.name, capacity, "started runtime thread");
        Ok(Arc::new(Self {
            id,
            sender: Mutex::new(Some(sender)),
            capacity,
            thread: join.thread().id(),
            runtime,
            running,
            join: Mutex::new(Some(join)),
        }))
    }

    /// Handle of the runtime, for spawning futures on the scheduler thread.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.runtime
    }

    /// Stops accepting work and waits for the accepted work to finish,
    /// unless called from the runtime thread.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let join = self.join.lock().take();
        if let Some(join) = join {
            if self.is_on_thread() {
                return;
            }
            if join.join().is_err() {
                tracing::warn!(scheduler = %self.id, "runtime thread panicked");
            }
        }
    }
}

impl Scheduler for TokioScheduler {
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
            Err(TrySendError::Closed(_)) => Err(SchedulerError::Stopped),
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

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .finish()
    }
}
