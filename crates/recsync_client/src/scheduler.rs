//! Deferred execution for inbound draining and outbound flushing.
//!
//! The connection never drains its queues on the caller's stack by
//! assumption; it hands a task to a [`Scheduler`] and the scheduler decides
//! when it runs. Tasks must run in submission order.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks handed over by the connection.
pub trait Scheduler: Send + Sync {
    /// Queues `task` for execution.
    fn schedule(&self, task: Task);
}

/// Runs every task inline, on the caller's stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Holds tasks until [`run_pending`](Self::run_pending) is called.
///
/// Deterministic: tests decide exactly when draining happens.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs queued tasks, including tasks they schedule, until the queue is
    /// empty. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // The lock is released before the task runs so it can schedule more.
            let Some(task) = self.queue.lock().pop_front() else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    /// Runs at most one queued task. Returns whether one ran.
    pub fn run_one(&self) -> bool {
        let task = self.queue.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Runs tasks on a tokio runtime.
///
/// Tasks are funnelled through one worker task, which keeps submission
/// order and yields to the runtime between tasks.
#[derive(Debug)]
pub struct TokioScheduler {
    sender: tokio::sync::mpsc::UnboundedSender<Task>,
}

impl TokioScheduler {
    /// Starts the worker loop on `handle`.
    pub fn new(handle: &tokio::runtime::Handle) -> Self {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
                tokio::task::yield_now().await;
            }
        });
        Self { sender }
    }

    /// Starts the worker loop on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(&tokio::runtime::Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        if self.sender.send(task).is_err() {
            tracing::warn!("scheduler worker has stopped; task dropped");
        }
    }
}
