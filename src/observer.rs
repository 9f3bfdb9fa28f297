//! Task observers.
//!
//! An observer is a registered listener notified of a task's milestones:
//! start of execution, dynamic production of new tasks, and finish.
//! Callbacks may fire on any thread; a consumer needing delivery on a
//! particular thread redispatches itself.

use crate::error::ErrorKind;
use crate::task::Task;

/// Listener for task milestones, invoked in registration order.
#[allow(unused_variables)]
pub trait TaskObserver: Send + Sync {
    /// Fired once, when the task transitions into `Executing`.
    fn task_did_start(&self, task: &Task) {}

    /// Fired whenever the task, while executing, emits a new task.
    /// The new task is an independent submission to the same queue; it
    /// does not block the producer's own finish.
    fn task_did_produce(&self, task: &Task, produced: &Task) {}

    /// Fired exactly once, after the task reaches `Finished`, with the
    /// full accumulated error list.
    fn task_did_finish(&self, task: &Task, errors: &[ErrorKind]) {}
}

type StartFn = Box<dyn Fn(&Task) + Send + Sync>;
type ProduceFn = Box<dyn Fn(&Task, &Task) + Send + Sync>;
type FinishFn = Box<dyn Fn(&Task, &[ErrorKind]) + Send + Sync>;

/// Observer assembled from closures.
#[derive(Default)]
pub struct BlockObserver {
    on_start: Option<StartFn>,
    on_produce: Option<ProduceFn>,
    on_finish: Option<FinishFn>,
}

impl BlockObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the start callback.
    #[must_use]
    pub fn on_start(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Builder: set the produce callback.
    #[must_use]
    pub fn on_produce(mut self, f: impl Fn(&Task, &Task) + Send + Sync + 'static) -> Self {
        self.on_produce = Some(Box::new(f));
        self
    }

    /// Builder: set the finish callback.
    #[must_use]
    pub fn on_finish(mut self, f: impl Fn(&Task, &[ErrorKind]) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }
}

impl TaskObserver for BlockObserver {
    fn task_did_start(&self, task: &Task) {
        if let Some(f) = &self.on_start {
            f(task);
        }
    }

    fn task_did_produce(&self, task: &Task, produced: &Task) {
        if let Some(f) = &self.on_produce {
            f(task, produced);
        }
    }

    fn task_did_finish(&self, task: &Task, errors: &[ErrorKind]) {
        if let Some(f) = &self.on_finish {
            f(task, errors);
        }
    }
}
