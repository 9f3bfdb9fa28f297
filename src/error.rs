//! Error types for the scheduling core.
//!
//! Centralized error handling using thiserror for type-safe errors.

use thiserror::Error;
use uuid::Uuid;

use crate::task::State;

/// Errors a task can have accumulated by the time it finishes.
///
/// Errors are local to the task that produced them: a task never
/// automatically surfaces a dependency's errors. Cross-task reactions
/// are expressed with conditions such as
/// [`NoFailedDependencies`](crate::condition::NoFailedDependencies).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The task was cancelled before or during execution.
    #[error("task was cancelled")]
    Cancelled,

    /// A condition attached to the task reported failure.
    #[error("condition '{category}' failed: {reason}")]
    ConditionFailed { category: String, reason: String },

    /// A dependency finished with errors. Informational: recorded only
    /// when a condition chooses to enforce it.
    #[error("dependency '{id}' finished with errors")]
    DependencyFailed { id: Uuid },

    /// The task's own work body failed.
    #[error("execution failed: {cause}")]
    ExecutionFailed { cause: String },

    /// A retrying task ran out of attempts.
    #[error("retry limit reached after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
}

/// API-misuse errors returned by mutating calls on tasks and queues.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("task '{id}' has already been submitted")]
    AlreadySubmitted { id: Uuid },

    #[error("task '{id}' cannot be modified after submission (state: {state})")]
    MutateAfterSubmit { id: Uuid, state: State },

    #[error("circular dependency detected involving task '{id}'")]
    CircularDependency { id: Uuid },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueueError>;
