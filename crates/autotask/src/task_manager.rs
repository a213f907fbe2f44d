//! Serialized task queue.
//!
//! A [`TaskManager`] owns a FIFO queue and at most one worker future that pops
//! tasks and runs them one at a time. Pausing cancels the running task and
//! queues a fresh copy at the tail; stopping cancels without requeue.
//!
//! Tasks run outside the queue with [`TaskManager::run_exclusive`] take the
//! same run lock as the worker, so at most one task is RUNNING at any time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::journal::{LogEntry, TaskJournal};
use crate::task::{Task, TaskContext, TaskHandle, TaskReport};

struct RunningTask {
    handle: TaskHandle,
    /// Fresh copy queued if the running task is paused
    restart: Task,
}

struct Worker {
    stop: CancellationToken,
    join: JoinHandle<()>,
}

impl Worker {
    fn is_active(&self) -> bool {
        !self.stop.is_cancelled() && !self.join.is_finished()
    }
}

struct ManagerInner {
    ctx: TaskContext,
    queue: Mutex<VecDeque<Task>>,
    wakeup: Notify,
    // Lock order: current before queue.
    current: Mutex<Option<RunningTask>>,
    worker: Mutex<Option<Worker>>,
    /// Held for the whole run of every task, queued or direct
    run_lock: AsyncMutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ManagerInner {
    async fn next_task(&self) -> Task {
        loop {
            if let Some(task) = lock(&self.queue).pop_front() {
                return task;
            }
            self.wakeup.notified().await;
        }
    }

    fn track(&self, task: &Task) {
        *lock(&self.current) = Some(RunningTask {
            handle: task.handle(),
            restart: task.restarted(),
        });
    }

    fn untrack(&self, handle: &TaskHandle) {
        let mut current = lock(&self.current);
        if current
            .as_ref()
            .is_some_and(|running| running.handle.same_task(handle))
        {
            *current = None;
        }
    }
}

/// Runs queued tasks strictly one after another.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                ctx,
                queue: Mutex::new(VecDeque::new()),
                wakeup: Notify::new(),
                current: Mutex::new(None),
                worker: Mutex::new(None),
                run_lock: AsyncMutex::new(()),
            }),
        }
    }

    pub fn context(&self) -> &TaskContext {
        &self.inner.ctx
    }

    pub fn journal(&self) -> &Arc<TaskJournal> {
        &self.inner.ctx.journal
    }

    /// Queue `task` and return its handle. The task runs once the worker is
    /// started with [`execute_tasks`](Self::execute_tasks).
    pub fn add_task(&self, task: Task) -> TaskHandle {
        let handle = task.handle();
        let pending = {
            let mut queue = lock(&self.inner.queue);
            queue.push_back(task);
            queue.len()
        };
        self.add_log(format!(
            "Task '{}' added to queue ({} pending)",
            handle.name(),
            pending
        ));
        self.inner.wakeup.notify_one();
        handle
    }

    /// Start the worker. Returns false if one is already running.
    ///
    /// Must be called from within a tokio runtime. A worker started after
    /// [`stop_and_clear_all_tasks`](Self::stop_and_clear_all_tasks) waits for
    /// the previous worker to wind down before running anything.
    #[instrument(level = "debug", skip(self))]
    pub fn execute_tasks(&self) -> bool {
        let mut slot = lock(&self.inner.worker);
        if slot.as_ref().is_some_and(Worker::is_active) {
            debug!("Task worker already running");
            return false;
        }

        let previous = slot.take().map(|worker| worker.join);
        let stop = CancellationToken::new();
        let join = tokio::spawn(run_worker(self.inner.clone(), stop.clone(), previous));
        *slot = Some(Worker { stop, join });
        drop(slot);

        self.add_log(format!(
            "Task worker started ({} pending)",
            self.pending_count()
        ));
        true
    }

    /// Run `task` now, outside the queue.
    ///
    /// Waits for the task the worker is running, if any, and holds off the
    /// worker until `task` reaches its terminal status. While it runs the task
    /// is the current task, so it can be paused or stopped like a queued one.
    #[instrument(level = "debug", skip_all, fields(task = %task.name()))]
    pub async fn run_exclusive(&self, task: Task) -> TaskReport {
        let _turn = self.inner.run_lock.lock().await;
        let handle = task.handle();
        self.inner.track(&task);
        self.add_log(format!("Running task '{}' outside the queue", handle.name()));
        let report = task.run(&self.inner.ctx).await;
        self.inner.untrack(&handle);
        report
    }

    /// Cancel the running task and queue a fresh copy of it at the tail.
    ///
    /// Returns false if nothing was running or the task finished before it
    /// could be cancelled.
    pub fn pause_current_task(&self) -> bool {
        let mut current = lock(&self.inner.current);
        let Some(running) = current.take() else {
            return false;
        };
        if !running.handle.cancel() {
            return false;
        }
        let name = running.handle.name().to_string();
        lock(&self.inner.queue).push_back(running.restart);
        drop(current);

        self.inner.wakeup.notify_one();
        self.add_log(format!("Task '{name}' paused and requeued"));
        true
    }

    /// Cancel the running task without requeueing it.
    pub fn stop_and_remove_current_task(&self) -> bool {
        let running = lock(&self.inner.current).take();
        match running {
            Some(running) if running.handle.cancel() => {
                self.add_log(format!(
                    "Task '{}' stopped and removed",
                    running.handle.name()
                ));
                true
            }
            _ => false,
        }
    }

    /// Cancel the running task, discard the queue and shut the worker down.
    ///
    /// Every discarded task reports CANCELLED. The manager can be reused with
    /// [`add_task`](Self::add_task) and [`execute_tasks`](Self::execute_tasks).
    #[instrument(level = "debug", skip(self))]
    pub async fn stop_and_clear_all_tasks(&self) {
        if let Some(worker) = lock(&self.inner.worker).as_ref() {
            worker.stop.cancel();
        }

        let (running, discarded) = {
            let mut current = lock(&self.inner.current);
            let running = current.take();
            let discarded: Vec<Task> = lock(&self.inner.queue).drain(..).collect();
            (running, discarded)
        };
        if let Some(running) = running {
            running.handle.cancel();
        }

        let count = discarded.len();
        for task in discarded {
            task.handle().cancel();
            task.run(&self.inner.ctx).await;
        }
        self.add_log(format!(
            "All tasks stopped, {count} queued task(s) discarded"
        ));
    }

    /// Append a line to the task journal.
    pub fn add_log(&self, message: impl Into<String>) -> LogEntry {
        self.inner.ctx.journal.log(message)
    }

    pub fn current_task(&self) -> Option<TaskHandle> {
        lock(&self.inner.current)
            .as_ref()
            .map(|running| running.handle.clone())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.worker)
            .as_ref()
            .is_some_and(Worker::is_active)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.queue).len()
    }
}

async fn run_worker(
    inner: Arc<ManagerInner>,
    stop: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        debug!("Waiting for the previous task worker to exit");
        let _ = previous.await;
    }

    loop {
        let task = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            task = inner.next_task() => task,
        };

        let turn = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            turn = inner.run_lock.lock() => Some(turn),
        };

        let handle = task.handle();
        let stopped = {
            let mut current = lock(&inner.current);
            if turn.is_none() || stop.is_cancelled() {
                true
            } else {
                *current = Some(RunningTask {
                    handle: handle.clone(),
                    restart: task.restarted(),
                });
                false
            }
        };
        if stopped {
            // Popped after a stop-all; report it like the rest of the queue.
            handle.cancel();
            task.run(&inner.ctx).await;
            break;
        }

        let remaining = lock(&inner.queue).len();
        inner.ctx.journal.log(format!(
            "Switching to task '{}' ({} remaining in queue)",
            handle.name(),
            remaining
        ));
        let report = task.run(&inner.ctx).await;
        debug!("Task '{}' finished with {}", report.name, report.status);
        inner.untrack(&handle);
        drop(turn);
    }

    info!("Task worker stopped");
}
