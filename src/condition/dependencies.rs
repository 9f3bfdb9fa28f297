//! Dependency-outcome gate.

use async_trait::async_trait;

use super::{ConditionOutcome, TaskCondition};
use crate::error::ErrorKind;
use crate::task::Task;

/// Fails its task when any dependency finished with errors.
///
/// Dependencies finishing with errors do not by themselves block a
/// dependent; attach this condition to tasks that should not run after
/// an upstream failure.
#[derive(Debug, Default)]
pub struct NoFailedDependencies;

impl NoFailedDependencies {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskCondition for NoFailedDependencies {
    fn name(&self) -> &str {
        "no_failed_dependencies"
    }

    async fn evaluate(&self, task: &Task) -> ConditionOutcome {
        // Evaluation never begins before the dependency set has finished,
        // so each dependency's error list is final here.
        for dep in task.dependencies() {
            if !dep.errors().is_empty() {
                return ConditionOutcome::Failed(ErrorKind::DependencyFailed { id: dep.id() });
            }
        }
        ConditionOutcome::Satisfied
    }
}
