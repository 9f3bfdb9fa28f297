//! Queue internals.
//!
//! All graph bookkeeping (active set, dependency-wait counters,
//! condition counters, exclusivity chains, ready backlog) lives behind
//! a single lock. Observer callbacks and work bodies always run with no
//! lock held.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use super::QueueStats;
use crate::condition::ConditionOutcome;
use crate::error::{ErrorKind, QueueError, Result};
use crate::observer::TaskObserver;
use crate::task::work::{Produced, TaskContext};
use crate::task::{State, Task, TaskId, Work};

/// A task claimed for execution, carried out of the lock before its
/// observers fire and its work body is spawned.
struct Dispatch {
    task: Task,
    work: Box<dyn Work>,
    observers: Vec<Arc<dyn TaskObserver>>,
}

pub(crate) struct QueueShared {
    core: Mutex<Core>,
    produce_tx: mpsc::UnboundedSender<Produced>,
    idle_tx: watch::Sender<bool>,
}

struct Core {
    /// Every submitted task not yet finished.
    active: HashMap<TaskId, Task>,
    /// Unfinished-dependency counters for `Pending` tasks.
    waiting: HashMap<TaskId, usize>,
    /// Outstanding-condition counters for `EvaluatingConditions` tasks.
    evaluating: HashMap<TaskId, usize>,
    /// Exclusivity category -> most recently chained task.
    exclusivity: HashMap<String, Task>,
    /// Ready tasks awaiting worker capacity, FIFO.
    ready: VecDeque<TaskId>,
    /// Tasks currently holding a worker slot.
    executing: HashSet<TaskId>,
    max_concurrency: Option<usize>,
    suspended: bool,
    stats: Counters,
}

#[derive(Default)]
struct Counters {
    submitted: usize,
    finished: usize,
    cancelled: usize,
    failed: usize,
}

impl QueueShared {
    pub(crate) fn new(
        max_concurrency: Option<usize>,
        start_suspended: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Produced>) {
        let (produce_tx, produce_rx) = mpsc::unbounded_channel();
        let (idle_tx, _) = watch::channel(true);
        let shared = Arc::new(Self {
            core: Mutex::new(Core {
                active: HashMap::new(),
                waiting: HashMap::new(),
                evaluating: HashMap::new(),
                exclusivity: HashMap::new(),
                ready: VecDeque::new(),
                executing: HashSet::new(),
                max_concurrency,
                suspended: start_suspended,
                stats: Counters::default(),
            }),
            produce_tx,
            idle_tx,
        });
        (shared, produce_rx)
    }

    /// Accept a submission: `Initialized -> Pending`, auxiliary and
    /// exclusivity dependencies registered, readiness kicked off.
    pub(crate) fn submit(self: &Arc<Self>, task: &Task) -> Result<()> {
        if task.state() != State::Initialized {
            return Err(QueueError::AlreadySubmitted { id: task.id() });
        }
        ensure_acyclic(task)?;

        // Conditions may inject auxiliary dependency tasks; those are
        // scheduled here, ahead of their owner.
        let conditions = task.conditions_snapshot();
        let mut auxiliaries = Vec::new();
        for condition in &conditions {
            if let Some(aux) = condition.dependency_for(task) {
                task.push_dependency_internal(aux.clone());
                auxiliaries.push(aux);
            }
        }
        for aux in auxiliaries {
            if aux.state() == State::Initialized {
                if let Err(error) = self.submit(&aux) {
                    warn!(aux = %aux.id(), %error, "auxiliary condition task rejected");
                }
            }
        }

        let (watched, dispatches, cancelled) = {
            let mut core = self.core();
            task.mark_submitted(Arc::downgrade(self))?;

            for condition in conditions.iter().filter(|c| c.mutually_exclusive()) {
                let category = condition.name();
                if let Some(prev) = core.exclusivity.get(category) {
                    if !prev.is_finished() {
                        trace!(task = %task.id(), %category, after = %prev.id(), "chained for exclusivity");
                        task.push_dependency_internal(prev.clone());
                    }
                }
                core.exclusivity.insert(category.to_string(), task.clone());
            }

            core.active.insert(task.id(), task.clone());
            core.stats.submitted += 1;
            let _ = self.idle_tx.send(false);
            debug!(task = %task.id(), name = %task.name(), "task submitted");

            if task.is_cancelled() {
                (Vec::new(), Vec::new(), true)
            } else {
                let unfinished: Vec<Task> = task
                    .dependencies()
                    .into_iter()
                    .filter(|dep| !dep.is_finished())
                    .collect();
                if unfinished.is_empty() {
                    self.advance_to_conditions_locked(&mut core, task);
                } else {
                    core.waiting.insert(task.id(), unfinished.len());
                }
                (unfinished, Self::pump_locked(&mut core), false)
            }
        };

        if cancelled {
            self.task_cancelled(task);
            return Ok(());
        }
        for dep in watched {
            let weak = Arc::downgrade(self);
            let waiter = task.id();
            tokio::spawn(async move {
                dep.wait().await;
                if let Some(queue) = weak.upgrade() {
                    queue.dependency_finished(waiter);
                }
            });
        }
        self.run_dispatches(dispatches);
        Ok(())
    }

    /// One of `waiter`'s dependencies reached `Finished`.
    pub(crate) fn dependency_finished(self: &Arc<Self>, waiter: TaskId) {
        let dispatches = {
            let mut core = self.core();
            let remaining = match core.waiting.get_mut(&waiter) {
                Some(count) => {
                    *count -= 1;
                    *count
                }
                None => return,
            };
            if remaining > 0 {
                return;
            }
            core.waiting.remove(&waiter);
            let Some(task) = core.active.get(&waiter).cloned() else {
                return;
            };
            trace!(task = %task.id(), "all dependencies finished");
            self.advance_to_conditions_locked(&mut core, &task);
            Self::pump_locked(&mut core)
        };
        self.run_dispatches(dispatches);
    }

    /// `Pending -> EvaluatingConditions`, spawning one evaluator per
    /// condition; straight to `Ready` when there are none.
    fn advance_to_conditions_locked(self: &Arc<Self>, core: &mut Core, task: &Task) {
        let Some(conditions) = task.begin_evaluating() else {
            return;
        };
        if conditions.is_empty() {
            if task.mark_ready() {
                core.ready.push_back(task.id());
            }
            return;
        }
        core.evaluating.insert(task.id(), conditions.len());
        for condition in conditions {
            let weak = Arc::downgrade(self);
            let task = task.clone();
            tokio::spawn(async move {
                let category = condition.name().to_string();
                trace!(task = %task.id(), %category, "evaluating condition");
                let outcome = condition.evaluate(&task).await;
                if let Some(queue) = weak.upgrade() {
                    queue.condition_resolved(&task, outcome, &category);
                }
            });
        }
    }

    /// A condition evaluator reported its outcome.
    pub(crate) fn condition_resolved(
        self: &Arc<Self>,
        task: &Task,
        outcome: ConditionOutcome,
        category: &str,
    ) {
        if let ConditionOutcome::Failed(error) = outcome {
            // First failure wins; late outcomes are discarded.
            if !task.record_condition_failure(error) {
                trace!(task = %task.id(), %category, "late condition outcome discarded");
                return;
            }
            {
                let mut core = self.core();
                core.evaluating.remove(&task.id());
            }
            debug!(task = %task.id(), %category, "condition failed; cancelling task");
            task.finish(Vec::new());
            return;
        }

        let dispatches = {
            let mut core = self.core();
            let remaining = match core.evaluating.get_mut(&task.id()) {
                Some(count) => {
                    *count -= 1;
                    *count
                }
                None => {
                    trace!(task = %task.id(), %category, "late condition outcome discarded");
                    return;
                }
            };
            if remaining > 0 {
                return;
            }
            core.evaluating.remove(&task.id());
            trace!(task = %task.id(), "all conditions satisfied");
            if task.mark_ready() {
                core.ready.push_back(task.id());
            }
            Self::pump_locked(&mut core)
        };
        self.run_dispatches(dispatches);
    }

    /// A task was cancelled before reaching `Executing`: skip the work
    /// body and finish it as cancelled.
    pub(crate) fn task_cancelled(self: &Arc<Self>, task: &Task) {
        {
            let mut core = self.core();
            if !core.active.contains_key(&task.id()) {
                return;
            }
            core.waiting.remove(&task.id());
            core.evaluating.remove(&task.id());
        }
        if task.state() >= State::Executing {
            return;
        }
        debug!(task = %task.id(), "cancelled before execution; skipping work body");
        task.finish(vec![ErrorKind::Cancelled]);
    }

    /// Called by the task itself after its finish, with observers
    /// already notified: release the task and any capacity it held.
    pub(crate) fn task_finished(self: &Arc<Self>, task: &Task) {
        let dispatches = {
            let mut core = self.core();
            if core.active.remove(&task.id()).is_none() {
                return;
            }
            core.executing.remove(&task.id());
            core.waiting.remove(&task.id());
            core.evaluating.remove(&task.id());
            core.exclusivity.retain(|_, chained| chained.id() != task.id());
            core.stats.finished += 1;
            if task.is_cancelled() {
                core.stats.cancelled += 1;
            }
            if !task.errors().is_empty() {
                core.stats.failed += 1;
            }
            if core.active.is_empty() {
                let _ = self.idle_tx.send(true);
            }
            Self::pump_locked(&mut core)
        };
        self.run_dispatches(dispatches);
    }

    /// Move ready tasks onto workers while capacity allows.
    fn pump_locked(core: &mut Core) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();
        if core.suspended {
            return dispatches;
        }
        while core
            .max_concurrency
            .map_or(true, |max| core.executing.len() < max)
        {
            let Some(id) = core.ready.pop_front() else {
                break;
            };
            let Some(task) = core.active.get(&id).cloned() else {
                continue;
            };
            // A task cancelled while ready has already left the state;
            // it is skipped here and finished through the cancel path.
            let Some((work, observers)) = task.begin_executing() else {
                continue;
            };
            core.executing.insert(id);
            dispatches.push(Dispatch {
                task,
                work,
                observers,
            });
        }
        dispatches
    }

    fn run_dispatches(self: &Arc<Self>, dispatches: Vec<Dispatch>) {
        for Dispatch {
            task,
            mut work,
            observers,
        } in dispatches
        {
            debug!(task = %task.id(), name = %task.name(), "executing");
            for observer in &observers {
                observer.task_did_start(&task);
            }
            let ctx = TaskContext {
                task,
                produce_tx: self.produce_tx.clone(),
            };
            tokio::spawn(async move {
                work.execute(&ctx).await;
            });
        }
    }

    pub(crate) fn suspend(&self) {
        self.core().suspended = true;
        debug!("queue suspended");
    }

    pub(crate) fn resume(self: &Arc<Self>) {
        let dispatches = {
            let mut core = self.core();
            core.suspended = false;
            Self::pump_locked(&mut core)
        };
        debug!("queue resumed");
        self.run_dispatches(dispatches);
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.core().suspended
    }

    pub(crate) fn cancel_all(&self) {
        let tasks: Vec<Task> = self.core().active.values().cloned().collect();
        debug!(count = tasks.len(), "cancelling all active tasks");
        for task in tasks {
            task.cancel();
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        self.core().active.len()
    }

    pub(crate) fn statistics(&self) -> QueueStats {
        let core = self.core();
        QueueStats {
            submitted: core.stats.submitted,
            active: core.active.len(),
            executing: core.executing.len(),
            finished: core.stats.finished,
            cancelled: core.stats.cancelled,
            failed: core.stats.failed,
        }
    }

    pub(crate) fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.idle_tx.subscribe()
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reject submissions whose dependency closure reaches back to the
/// submitted task; such a task could never become unblocked.
fn ensure_acyclic(task: &Task) -> Result<()> {
    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut stack = task.dependencies();
    while let Some(dep) = stack.pop() {
        if dep.id() == task.id() {
            return Err(QueueError::CircularDependency { id: task.id() });
        }
        if visited.insert(dep.id()) {
            stack.extend(dep.dependencies());
        }
    }
    Ok(())
}
