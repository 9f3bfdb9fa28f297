//! Conditions: asynchronous gates evaluated before a task executes.
//!
//! Every condition attached to a task is evaluated concurrently once the
//! task's dependencies have finished. A condition may first require an
//! auxiliary task (see [`TaskCondition::dependency_for`]); that task is
//! injected into the owner's dependency set and scheduled on the same
//! queue. A single failure cancels the owning task with the condition's
//! error; outcomes arriving after that are discarded.

mod dependencies;
mod exclusive;

pub use dependencies::NoFailedDependencies;
pub use exclusive::MutuallyExclusive;

use async_trait::async_trait;

use crate::error::ErrorKind;
use crate::task::Task;

/// Outcome of evaluating a single condition. Delivered exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOutcome {
    Satisfied,
    Failed(ErrorKind),
}

impl ConditionOutcome {
    /// Shorthand for a [`ErrorKind::ConditionFailed`] outcome.
    #[must_use]
    pub fn failed(category: impl Into<String>, reason: impl Into<String>) -> Self {
        ConditionOutcome::Failed(ErrorKind::ConditionFailed {
            category: category.into(),
            reason: reason.into(),
        })
    }

    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ConditionOutcome::Satisfied)
    }
}

/// An asynchronous predicate gating a task's execution.
#[async_trait]
pub trait TaskCondition: Send + Sync {
    /// Category name. Doubles as the exclusivity key for
    /// mutually-exclusive conditions and as the label in
    /// condition-failure errors.
    fn name(&self) -> &str;

    /// When true, no two tasks holding a condition of this category may
    /// execute concurrently. The queue serializes them by chaining each
    /// newly submitted holder onto the previously chained one.
    fn mutually_exclusive(&self) -> bool {
        false
    }

    /// Optional auxiliary task that must be scheduled and finished
    /// before this condition is evaluated.
    fn dependency_for(&self, _task: &Task) -> Option<Task> {
        None
    }

    /// Evaluate the condition for `task`. Runs only after every
    /// dependency of `task` (auxiliary ones included) has finished.
    async fn evaluate(&self, task: &Task) -> ConditionOutcome;
}
