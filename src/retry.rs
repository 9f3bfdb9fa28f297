//! Retrying decorator tasks.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ErrorKind;
use crate::task::Task;

impl Task {
    /// Decorator that re-submits a freshly constructed replacement task
    /// when an attempt finishes with errors and `should_retry` approves,
    /// up to `maximum_retry_count` retries beyond the first attempt.
    ///
    /// Each attempt comes from `factory` and is produced onto the same
    /// queue the retrying task runs on; at most one attempt is in
    /// flight, and a finished attempt is never reused. On success the
    /// task finishes clean; when the bound is hit,
    /// [`ErrorKind::RetryExhausted`] is appended after the final
    /// attempt's own errors. Cancelling the task cancels the in-flight
    /// attempt and suppresses any further retry.
    pub fn retrying<F, P>(
        name: impl Into<String>,
        maximum_retry_count: u32,
        mut factory: F,
        mut should_retry: P,
    ) -> Task
    where
        F: FnMut() -> Task + Send + 'static,
        P: FnMut(&Task, &[ErrorKind]) -> bool + Send + 'static,
    {
        let current: Arc<Mutex<Option<Task>>> = Arc::new(Mutex::new(None));
        let slot = current.clone();

        let task = Task::from_fn(name, move |ctx| async move {
            let mut attempts_made: u32 = 0;
            loop {
                let child = factory();
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(child.clone());
                if ctx.is_cancelled() {
                    ctx.finish(vec![ErrorKind::Cancelled]);
                    return;
                }
                ctx.produce(child.clone());
                child.wait().await;
                let errors = child.errors();
                if ctx.is_cancelled() {
                    // Finish with this attempt's outcome; no further retry.
                    ctx.finish(errors);
                    return;
                }
                if errors.is_empty() {
                    ctx.finish(Vec::new());
                    return;
                }
                if attempts_made < maximum_retry_count {
                    if should_retry(&child, &errors) {
                        attempts_made += 1;
                        continue;
                    }
                    ctx.finish(errors);
                    return;
                }
                let mut errors = errors;
                errors.push(ErrorKind::RetryExhausted {
                    attempts: attempts_made + 1,
                });
                ctx.finish(errors);
                return;
            }
        });
        task.add_cancel_hook(Box::new(move || {
            let in_flight = current
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(child) = in_flight {
                child.cancel();
            }
        }));
        task
    }
}
