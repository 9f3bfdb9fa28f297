//! Closure-backed leaf task.

use super::model::Task;
use crate::error::ErrorKind;

impl Task {
    /// Leaf task adapting a plain closure to the finish contract: the
    /// closure's result becomes the task's outcome and the finish call
    /// is taken care of.
    pub fn block<F>(name: impl Into<String>, body: F) -> Task
    where
        F: FnOnce() -> std::result::Result<(), ErrorKind> + Send + 'static,
    {
        Task::from_fn(name, move |ctx| async move {
            match body() {
                Ok(()) => ctx.finish(Vec::new()),
                Err(error) => ctx.finish(vec![error]),
            }
        })
    }
}
