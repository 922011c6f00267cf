//! Gated task scheduling
//!
//! Components sometimes need the host to decide *when* expensive work runs
//! (decoder warmup, large fetches), while the core only cares *whether* it
//! ran. [`TaskQueueManager`] holds tasks keyed by id until an
//! [`ExecutionQueue`] releases them, and rejects everything still pending
//! when it is torn down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::debug;

use crate::error::{Error, Result};
use crate::signal::Signal;

type TaskWork = Box<dyn FnOnce() -> Option<BoxFuture<'static, ()>> + Send>;

/// Where released tasks actually execute.
///
/// The default [`ImmediateExecutionQueue`] spawns each task as soon as it
/// is added; a host can substitute a queue that batches, throttles, or
/// defers to idle time instead.
pub trait ExecutionQueue: Send + Sync {
    fn add(&self, task: Arc<QueuedTask>);
    fn remove(&self, task: &Arc<QueuedTask>);
}

/// One unit of gated work.
pub struct QueuedTask {
    id: String,
    started: AtomicBool,
    signal: Signal,
    work: Mutex<Option<TaskWork>>,
    manager_destroyed: Arc<AtomicBool>,
}

impl std::fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTask")
            .field("id", &self.id)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl QueuedTask {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Label under which execution queues may account for this task.
    pub fn label(&self) -> String {
        format!("queued-task:{}", self.id)
    }

    /// Settles when the work completed, or rejects when the manager was
    /// destroyed first.
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Execute the task. Called by the [`ExecutionQueue`] once it decides
    /// the task may run.
    ///
    /// If the owning manager was destroyed in the meantime the work is
    /// dropped and the signal rejects with
    /// [`Error::RunTaskInDestroyedTaskQueueManager`].
    pub async fn run(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.manager_destroyed.load(Ordering::SeqCst) {
            let _ = self
                .signal
                .reject(Error::RunTaskInDestroyedTaskQueueManager(self.id.clone()));
            return;
        }
        let work = self.work.lock().unwrap().take();
        if let Some(work) = work {
            if let Some(future) = work() {
                future.await;
            }
        }
        self.signal.settle();
    }

    fn reject_unstarted(&self) {
        if !self.started() {
            let _ = self.signal.reject(Error::TaskQueueManagerDestroyed);
        }
    }
}

/// Holds gated tasks by id and feeds them to an [`ExecutionQueue`].
pub struct TaskQueueManager {
    destroyed: Arc<AtomicBool>,
    tasks: Mutex<HashMap<String, Arc<QueuedTask>>>,
    queue: Arc<dyn ExecutionQueue>,
}

impl TaskQueueManager {
    pub fn new(queue: Arc<dyn ExecutionQueue>) -> Self {
        Self {
            destroyed: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(HashMap::new()),
            queue,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Register the task `id` with its work factory and hand it to the
    /// execution queue.
    ///
    /// Settled tasks are purged first, so an id may be reused once its
    /// earlier run finished; a still-pending duplicate fails with
    /// [`Error::TaskAlreadyAdded`].
    pub fn require(
        &self,
        id: &str,
        work: impl FnOnce() -> Option<BoxFuture<'static, ()>> + Send + 'static,
    ) -> Result<Arc<QueuedTask>> {
        if self.is_destroyed() {
            return Err(Error::TaskQueueManagerDestroyed);
        }

        let task = {
            let mut tasks = self.tasks.lock().unwrap();
            tasks.retain(|_, task| !task.signal().is_settled());
            if tasks.contains_key(id) {
                return Err(Error::TaskAlreadyAdded(id.to_owned()));
            }
            let task = Arc::new(QueuedTask {
                id: id.to_owned(),
                started: AtomicBool::new(false),
                signal: Signal::new(),
                work: Mutex::new(Some(Box::new(work))),
                manager_destroyed: Arc::clone(&self.destroyed),
            });
            tasks.insert(id.to_owned(), Arc::clone(&task));
            task
        };

        debug!(task_id = id, "queueing gated task");
        self.queue.add(Arc::clone(&task));
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<Arc<QueuedTask>> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    /// Tear the manager down: dequeue every task that has not started and
    /// reject its signal with [`Error::TaskQueueManagerDestroyed`]. Tasks
    /// already running are left to finish.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks: Vec<Arc<QueuedTask>> = self.tasks.lock().unwrap().drain().map(|(_, t)| t).collect();
        debug!(pending = tasks.len(), "destroying task queue manager");
        for task in &tasks {
            self.queue.remove(task);
            task.reject_unstarted();
        }
    }
}

/// Runs each task on the tokio runtime the moment it is added.
#[derive(Default)]
pub struct ImmediateExecutionQueue;

impl ExecutionQueue for ImmediateExecutionQueue {
    fn add(&self, task: Arc<QueuedTask>) {
        tokio::spawn(task.run());
    }

    fn remove(&self, _task: &Arc<QueuedTask>) {
        // already spawned; QueuedTask::run re-checks the destroyed flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalState;

    /// Holds tasks until the test releases them explicitly.
    #[derive(Default)]
    struct HeldQueue {
        held: Mutex<Vec<Arc<QueuedTask>>>,
    }

    impl ExecutionQueue for HeldQueue {
        fn add(&self, task: Arc<QueuedTask>) {
            self.held.lock().unwrap().push(task);
        }
        fn remove(&self, task: &Arc<QueuedTask>) {
            self.held
                .lock()
                .unwrap()
                .retain(|held| !Arc::ptr_eq(held, task));
        }
    }

    #[tokio::test]
    async fn test_task_runs_and_settles() {
        let manager = TaskQueueManager::new(Arc::new(ImmediateExecutionQueue));
        let task = manager
            .require("warmup", || Some(Box::pin(async {})))
            .unwrap();
        task.signal().wait().await.unwrap();
        assert!(task.started());
    }

    #[tokio::test]
    async fn test_duplicate_pending_id_rejected() {
        let queue = Arc::new(HeldQueue::default());
        let manager = TaskQueueManager::new(queue as Arc<dyn ExecutionQueue>);
        manager.require("fetch", || None).unwrap();
        assert_eq!(
            manager.require("fetch", || None).unwrap_err(),
            Error::TaskAlreadyAdded("fetch".to_owned())
        );
    }

    #[tokio::test]
    async fn test_id_reusable_after_settle() {
        let manager = TaskQueueManager::new(Arc::new(ImmediateExecutionQueue));
        let first = manager.require("fetch", || None).unwrap();
        first.signal().wait().await.unwrap();
        // settled entry purged on the next require
        manager.require("fetch", || None).unwrap();
    }

    #[tokio::test]
    async fn test_destroy_rejects_pending_tasks() {
        let queue = Arc::new(HeldQueue::default());
        let manager = TaskQueueManager::new(Arc::clone(&queue) as Arc<dyn ExecutionQueue>);
        let task = manager.require("never", || None).unwrap();

        manager.destroy();
        assert_eq!(
            task.signal().wait().await.unwrap_err(),
            Error::TaskQueueManagerDestroyed
        );
        assert_eq!(
            manager.require("more", || None).unwrap_err(),
            Error::TaskQueueManagerDestroyed
        );
        assert!(queue.held.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_after_destroy_rejects_without_executing() {
        let queue = Arc::new(HeldQueue::default());
        let manager = TaskQueueManager::new(Arc::clone(&queue) as Arc<dyn ExecutionQueue>);

        let ran = Arc::new(AtomicBool::new(false));
        let ran_flag = Arc::clone(&ran);
        let task = manager
            .require("late", move || {
                ran_flag.store(true, Ordering::SeqCst);
                None
            })
            .unwrap();

        manager.destroy();
        assert_eq!(task.signal().state(), SignalState::Rejected);
        assert!(queue.held.lock().unwrap().is_empty());

        // an executor holding a stale reference may still call run(); the
        // work must not execute
        Arc::clone(&task).run().await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(
            task.signal().wait().await.unwrap_err(),
            Error::TaskQueueManagerDestroyed
        );
    }
}
