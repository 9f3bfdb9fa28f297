//! Category-keyed mutual exclusion.

use async_trait::async_trait;

use super::{ConditionOutcome, TaskCondition};
use crate::task::Task;

/// Serializes all tasks sharing a category: no two of them execute
/// concurrently, independent of the rest of the dependency graph.
///
/// The gate itself always passes; the serialization comes from the
/// queue chaining each new holder of the category onto the previous
/// one at submission time.
pub struct MutuallyExclusive {
    category: String,
}

impl MutuallyExclusive {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

#[async_trait]
impl TaskCondition for MutuallyExclusive {
    fn name(&self) -> &str {
        &self.category
    }

    fn mutually_exclusive(&self) -> bool {
        true
    }

    async fn evaluate(&self, _task: &Task) -> ConditionOutcome {
        ConditionOutcome::Satisfied
    }
}
