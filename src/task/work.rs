//! Work bodies and the execution-time context handle.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::model::Task;
use crate::error::ErrorKind;

/// The execution body of a task.
///
/// `execute` is invoked at most once, only from the `Executing` state,
/// and only if the task was not cancelled before reaching `Ready`. The
/// body owns the finish contract: it must arrange for
/// [`TaskContext::finish`] to be called exactly once, and it must
/// observe [`TaskContext::is_cancelled`] cooperatively; nothing
/// preempts a running body.
#[async_trait]
pub trait Work: Send + 'static {
    async fn execute(&mut self, ctx: &TaskContext);
}

/// A produced task travelling from a work body to its queue.
pub(crate) struct Produced {
    pub(crate) parent: Task,
    pub(crate) task: Task,
}

/// Handle given to an executing work body.
///
/// Cheap to clone; a body may hand clones to other threads and finish
/// the task from any of them.
#[derive(Clone)]
pub struct TaskContext {
    pub(crate) task: Task,
    pub(crate) produce_tx: mpsc::UnboundedSender<Produced>,
}

impl TaskContext {
    /// The task this body is executing.
    #[must_use]
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Check the cooperative cancellation flag.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.task.cancelled().await;
    }

    /// Deliver the task's single finish. A second call is discarded.
    pub fn finish(&self, errors: Vec<ErrorKind>) {
        self.task.finish(errors);
    }

    /// Hand a newly constructed task to the owning queue. The produced
    /// task is an independent top-level submission; it does not become a
    /// dependent of this task and does not block this task's finish.
    pub fn produce(&self, task: Task) {
        let _ = self.produce_tx.send(Produced {
            parent: self.task.clone(),
            task,
        });
    }
}

type BoxWorkFn = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, ()> + Send>;

/// Adapter turning an async closure into a [`Work`] body.
pub(crate) struct FnWork {
    f: Option<BoxWorkFn>,
}

impl FnWork {
    pub(crate) fn new(f: BoxWorkFn) -> Self {
        Self { f: Some(f) }
    }
}

#[async_trait]
impl Work for FnWork {
    async fn execute(&mut self, ctx: &TaskContext) {
        if let Some(f) = self.f.take() {
            f(ctx.clone()).await;
        }
    }
}
