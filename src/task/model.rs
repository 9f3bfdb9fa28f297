//! The task handle and its shared state machine.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, trace};
use uuid::Uuid;

use super::state::State;
use super::work::{FnWork, Work};
use crate::condition::TaskCondition;
use crate::error::{ErrorKind, QueueError, Result};
use crate::observer::TaskObserver;
use crate::queue::core::QueueShared;

/// Task identifier.
pub type TaskId = Uuid;

/// A unit of schedulable, cancellable work.
///
/// A `Task` is a handle over shared mutable state: cloning is cheap and
/// every clone refers to the same task (reference identity, compared
/// with `==`). Dependencies, conditions, and observers are attached
/// before submission; after submission the queue drives the task
/// through its state machine and the work body delivers the single
/// finish.
#[derive(Clone)]
pub struct Task {
    shared: Arc<TaskShared>,
}

struct TaskShared {
    id: TaskId,
    name: String,
    created_at: DateTime<Utc>,
    state_tx: watch::Sender<State>,
    cancel_tx: watch::Sender<bool>,
    inner: Mutex<TaskInner>,
}

struct TaskInner {
    state: State,
    cancelled: bool,
    errors: Vec<ErrorKind>,
    dependencies: Vec<Task>,
    conditions: Vec<Arc<dyn TaskCondition>>,
    observers: Vec<Arc<dyn TaskObserver>>,
    cancel_hooks: Vec<Box<dyn FnOnce() + Send>>,
    work: Option<Box<dyn Work>>,
    queue: Option<Weak<QueueShared>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task from a [`Work`] implementation.
    pub fn new(name: impl Into<String>, work: impl Work) -> Self {
        Self::with_boxed_work(name.into(), Box::new(work))
    }

    /// Create a task from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(super::work::TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wrapped = move |ctx| -> BoxFuture<'static, ()> { Box::pin(f(ctx)) };
        Self::with_boxed_work(name.into(), Box::new(FnWork::new(Box::new(wrapped))))
    }

    fn with_boxed_work(name: String, work: Box<dyn Work>) -> Self {
        let (state_tx, _) = watch::channel(State::Initialized);
        let (cancel_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(TaskShared {
                id: Uuid::new_v4(),
                name,
                created_at: Utc::now(),
                state_tx,
                cancel_tx,
                inner: Mutex::new(TaskInner {
                    state: State::Initialized,
                    cancelled: false,
                    errors: Vec::new(),
                    dependencies: Vec::new(),
                    conditions: Vec::new(),
                    observers: Vec::new(),
                    cancel_hooks: Vec::new(),
                    work: Some(work),
                    queue: None,
                    started_at: None,
                    finished_at: None,
                }),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Readable properties

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.shared.created_at
    }

    #[must_use]
    pub fn state(&self) -> State {
        *self.shared.state_tx.borrow()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == State::Ready
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.state() == State::Executing
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state() == State::Finished
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.shared.cancel_tx.borrow()
    }

    /// The errors accumulated so far. Final once the task is finished:
    /// condition failures first, then whatever the work body reported.
    #[must_use]
    pub fn errors(&self) -> Vec<ErrorKind> {
        self.inner().errors.clone()
    }

    /// The dependency set. Fixed once the task is submitted.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Task> {
        self.inner().dependencies.clone()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner().started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.inner().finished_at
    }

    /// Execution duration in milliseconds, while running or after finish.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        let inner = self.inner();
        match (inner.started_at, inner.finished_at) {
            (Some(start), Some(end)) => {
                Some(end.signed_duration_since(start).num_milliseconds().max(0) as u64)
            }
            (Some(start), None) => {
                Some(Utc::now().signed_duration_since(start).num_milliseconds().max(0) as u64)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Pre-submission configuration

    /// Add a dependency. The task will not evaluate conditions until
    /// `dep` has finished, regardless of `dep`'s own outcome.
    pub fn add_dependency(&self, dep: &Task) -> Result<()> {
        let mut inner = self.inner();
        if inner.state != State::Initialized {
            return Err(QueueError::MutateAfterSubmit {
                id: self.shared.id,
                state: inner.state,
            });
        }
        inner.dependencies.push(dep.clone());
        Ok(())
    }

    /// Attach a condition.
    pub fn add_condition(&self, condition: impl TaskCondition + 'static) -> Result<()> {
        let mut inner = self.inner();
        if inner.state != State::Initialized {
            return Err(QueueError::MutateAfterSubmit {
                id: self.shared.id,
                state: inner.state,
            });
        }
        inner.conditions.push(Arc::new(condition));
        Ok(())
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn add_observer(&self, observer: impl TaskObserver + 'static) -> Result<()> {
        self.add_observer_arc(Arc::new(observer))
    }

    pub(crate) fn add_observer_arc(&self, observer: Arc<dyn TaskObserver>) -> Result<()> {
        let mut inner = self.inner();
        if inner.state != State::Initialized {
            return Err(QueueError::MutateAfterSubmit {
                id: self.shared.id,
                state: inner.state,
            });
        }
        inner.observers.push(observer);
        Ok(())
    }

    /// Hook fired once, on the first `cancel` call. Used by composite
    /// tasks to fan cancellation out to inner work.
    pub(crate) fn add_cancel_hook(&self, hook: Box<dyn FnOnce() + Send>) {
        self.inner().cancel_hooks.push(hook);
    }

    // ------------------------------------------------------------------
    // Lifecycle entry points

    /// Request cooperative cancellation. Safe from any thread, at any
    /// state before `Finished`; repeated calls are no-ops.
    ///
    /// A task not yet executing skips straight to finishing and its work
    /// body is never invoked. An executing task only has its flag set;
    /// the body is expected to observe it and finish promptly.
    pub fn cancel(&self) {
        let (hooks, queue, state) = {
            let mut inner = self.inner();
            if inner.cancelled || inner.state == State::Finished {
                return;
            }
            self.set_cancelled(&mut inner);
            (
                std::mem::take(&mut inner.cancel_hooks),
                inner.queue.clone(),
                inner.state,
            )
        };
        debug!(task = %self.shared.id, %state, "cancellation requested");
        for hook in hooks {
            hook();
        }
        if state > State::Initialized && state < State::Executing {
            if let Some(queue) = queue.and_then(|weak| weak.upgrade()) {
                queue.task_cancelled(self);
            }
        }
    }

    /// Deliver the task's single finish.
    ///
    /// This is the one contract every work body must honor: call it
    /// exactly once when done. A second call is discarded; only the
    /// first call's errors are recorded and observers are notified once.
    pub fn finish(&self, errors: Vec<ErrorKind>) {
        let delivered = {
            let mut inner = self.inner();
            if inner.state >= State::Finishing {
                trace!(task = %self.shared.id, "duplicate finish discarded");
                None
            } else {
                self.transition(&mut inner, State::Finishing);
                inner.errors.extend(errors);
                inner.finished_at = Some(Utc::now());
                self.transition(&mut inner, State::Finished);
                Some((
                    inner.observers.clone(),
                    inner.errors.clone(),
                    inner.queue.clone(),
                ))
            }
        };
        let Some((observers, errors, queue)) = delivered else {
            return;
        };
        debug!(task = %self.shared.id, name = %self.shared.name, errors = errors.len(), "task finished");
        for observer in &observers {
            observer.task_did_finish(self, &errors);
        }
        if let Some(queue) = queue.and_then(|weak| weak.upgrade()) {
            queue.task_finished(self);
        }
    }

    /// Resolves once the task has finished. Usable from any clone of the
    /// handle, before or after submission.
    pub async fn wait(&self) {
        let mut rx = self.shared.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == State::Finished).await;
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.shared.cancel_tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    // ------------------------------------------------------------------
    // Queue-side transitions

    pub(crate) fn conditions_snapshot(&self) -> Vec<Arc<dyn TaskCondition>> {
        self.inner().conditions.clone()
    }

    pub(crate) fn observers_snapshot(&self) -> Vec<Arc<dyn TaskObserver>> {
        self.inner().observers.clone()
    }

    /// Dependency injection used by the queue itself (condition
    /// auxiliaries, exclusivity chains); bypasses the submission check.
    pub(crate) fn push_dependency_internal(&self, dep: Task) {
        self.inner().dependencies.push(dep);
    }

    /// `Initialized -> Pending`, claiming the task for `queue`.
    pub(crate) fn mark_submitted(&self, queue: Weak<QueueShared>) -> Result<()> {
        let mut inner = self.inner();
        if inner.state != State::Initialized {
            return Err(QueueError::AlreadySubmitted { id: self.shared.id });
        }
        inner.queue = Some(queue);
        self.transition(&mut inner, State::Pending);
        Ok(())
    }

    /// `Pending -> EvaluatingConditions`. Returns the conditions to
    /// evaluate, or `None` if the task has moved on (e.g. cancelled).
    pub(crate) fn begin_evaluating(&self) -> Option<Vec<Arc<dyn TaskCondition>>> {
        let mut inner = self.inner();
        if inner.state != State::Pending || inner.cancelled {
            return None;
        }
        self.transition(&mut inner, State::EvaluatingConditions);
        Some(inner.conditions.clone())
    }

    /// `EvaluatingConditions -> Ready`.
    pub(crate) fn mark_ready(&self) -> bool {
        let mut inner = self.inner();
        if inner.state != State::EvaluatingConditions || inner.cancelled {
            return false;
        }
        self.transition(&mut inner, State::Ready);
        true
    }

    /// `Ready -> Executing`, handing out the work body. Returns `None`
    /// when the task is no longer dispatchable.
    pub(crate) fn begin_executing(
        &self,
    ) -> Option<(Box<dyn Work>, Vec<Arc<dyn TaskObserver>>)> {
        let mut inner = self.inner();
        if inner.state != State::Ready || inner.cancelled {
            return None;
        }
        let work = inner.work.take()?;
        self.transition(&mut inner, State::Executing);
        inner.started_at = Some(Utc::now());
        Some((work, inner.observers.clone()))
    }

    /// Record a condition failure while still evaluating: stores the
    /// error, raises the cancellation flag, and reports whether this
    /// call won the race (late outcomes return `false` and are
    /// discarded).
    pub(crate) fn record_condition_failure(&self, error: ErrorKind) -> bool {
        let mut inner = self.inner();
        if inner.state != State::EvaluatingConditions || inner.cancelled {
            return false;
        }
        inner.errors.push(error);
        self.set_cancelled(&mut inner);
        true
    }

    // ------------------------------------------------------------------

    fn inner(&self) -> MutexGuard<'_, TaskInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut TaskInner, next: State) {
        trace!(task = %self.shared.id, from = %inner.state, to = %next, "state transition");
        inner.state = next;
        let _ = self.shared.state_tx.send(next);
    }

    fn set_cancelled(&self, inner: &mut TaskInner) {
        inner.cancelled = true;
        let _ = self.shared.cancel_tx.send(true);
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
