//! The task queue: a concurrent executor for submitted tasks.
//!
//! The queue owns the active task set, advances every task through its
//! state machine as dependencies finish and conditions resolve, and
//! dispatches ready tasks onto workers as capacity allows. Tasks
//! produced dynamically by running work bodies are absorbed through a
//! channel and scheduled as independent top-level submissions.

pub(crate) mod core;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use self::core::QueueShared;
use crate::error::Result;
use crate::task::Task;

/// Queue configuration.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Maximum number of concurrently executing tasks. `None` means
    /// unbounded.
    pub max_concurrency: Option<usize>,
    /// Start with dispatch held: submitted tasks advance to `Ready` but
    /// nothing executes until [`TaskQueue::resume`].
    pub start_suspended: bool,
}

impl QueueConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: bound the worker pool.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Builder: start suspended.
    #[must_use]
    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Tasks accepted over the queue's lifetime.
    pub submitted: usize,
    /// Tasks submitted and not yet finished.
    pub active: usize,
    /// Tasks currently holding a worker slot.
    pub executing: usize,
    /// Tasks that reached `Finished`.
    pub finished: usize,
    /// Finished tasks that were cancelled.
    pub cancelled: usize,
    /// Finished tasks with a non-empty error list.
    pub failed: usize,
}

impl QueueStats {
    /// Completion progress as a percentage (0-100).
    #[must_use]
    pub fn progress_percent(&self) -> f32 {
        if self.submitted == 0 {
            return 100.0;
        }
        (self.finished as f32 / self.submitted as f32) * 100.0
    }
}

/// Concurrent task executor.
///
/// Cloning yields another handle to the same queue. Must be created
/// inside a Tokio runtime.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<QueueShared>,
}

impl TaskQueue {
    /// Create a queue with default configuration (unbounded workers).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a queue with the given configuration.
    #[must_use]
    pub fn with_config(config: QueueConfig) -> Self {
        let (shared, mut produce_rx) =
            QueueShared::new(config.max_concurrency, config.start_suspended);
        let weak = Arc::downgrade(&shared);
        // Absorb dynamically produced tasks for the queue's lifetime.
        tokio::spawn(async move {
            while let Some(produced) = produce_rx.recv().await {
                let Some(queue) = weak.upgrade() else {
                    break;
                };
                for observer in produced.parent.observers_snapshot() {
                    observer.task_did_produce(&produced.parent, &produced.task);
                }
                if let Err(error) = queue.submit(&produced.task) {
                    warn!(task = %produced.task.id(), %error, "produced task rejected");
                }
            }
        });
        Self { shared }
    }

    /// Enqueue a top-level task. The task's dependencies, conditions,
    /// and observers are fixed from this point on.
    pub fn submit(&self, task: &Task) -> Result<()> {
        self.shared.submit(task)
    }

    /// Hold dispatch: tasks keep advancing to `Ready` but none starts
    /// executing until [`resume`](Self::resume).
    pub fn suspend(&self) {
        self.shared.suspend();
    }

    /// Release dispatch and drain the ready backlog.
    pub fn resume(&self) {
        self.shared.resume();
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.shared.is_suspended()
    }

    /// Request cancellation of every task in the active set.
    pub fn cancel_all(&self) {
        self.shared.cancel_all();
    }

    /// Number of submitted tasks not yet finished.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.active_count()
    }

    /// Resolves once the active set is empty. Resolves immediately on an
    /// empty queue.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.shared.subscribe_idle();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    /// Snapshot of the queue counters.
    #[must_use]
    pub fn statistics(&self) -> QueueStats {
        self.shared.statistics()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("stats", &self.statistics())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}
