//! Composite group tasks.
//!
//! A group wraps a fixed set of child tasks inside the outer task state
//! machine. The children are submitted to a nested, suspended queue at
//! construction; the group's `Executing` phase releases that queue and
//! is held open until its active set drains. Cancelling the group
//! cancels every not-yet-finished child.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::error::ErrorKind;
use crate::observer::TaskObserver;
use crate::queue::{QueueConfig, TaskQueue};
use crate::task::Task;

/// Collects child errors in child completion order.
struct ErrorCollector {
    sink: Arc<Mutex<Vec<ErrorKind>>>,
}

impl TaskObserver for ErrorCollector {
    fn task_did_finish(&self, _task: &Task, errors: &[ErrorKind]) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(errors);
    }
}

impl Task {
    /// Composite task presenting `children` as a single schedulable
    /// unit. The group's error list is the concatenation of all child
    /// error lists in completion order, plus any error raised by the
    /// group itself.
    ///
    /// Children must be freshly constructed tasks; they are owned by
    /// the group's internal queue from this point on. Must be called
    /// inside a Tokio runtime.
    #[must_use]
    pub fn group(name: impl Into<String>, children: Vec<Task>) -> Task {
        Self::group_with_config(name, children, QueueConfig::default())
    }

    /// [`Task::group`] with an explicit configuration for the internal
    /// queue (e.g. a concurrency bound for the children).
    #[must_use]
    pub fn group_with_config(
        name: impl Into<String>,
        children: Vec<Task>,
        config: QueueConfig,
    ) -> Task {
        // The inner queue holds dispatch until the group itself executes;
        // children still advance through dependencies and conditions.
        let inner = TaskQueue::with_config(QueueConfig {
            start_suspended: true,
            ..config
        });
        let collected: Arc<Mutex<Vec<ErrorKind>>> = Arc::new(Mutex::new(Vec::new()));

        for child in &children {
            let collector = ErrorCollector {
                sink: collected.clone(),
            };
            if let Err(error) = child.add_observer(collector) {
                warn!(child = %child.id(), %error, "group child rejected");
                continue;
            }
            if let Err(error) = inner.submit(child) {
                warn!(child = %child.id(), %error, "group child rejected");
            }
        }

        let task = Task::from_fn(name, {
            let inner = inner.clone();
            let collected = collected.clone();
            move |ctx| async move {
                inner.resume();
                inner.wait_until_idle().await;
                let errors = std::mem::take(
                    &mut *collected.lock().unwrap_or_else(PoisonError::into_inner),
                );
                ctx.finish(errors);
            }
        });
        task.add_cancel_hook(Box::new(move || inner.cancel_all()));
        task
    }
}
