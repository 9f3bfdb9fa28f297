//! Timed-delay leaf task.

use std::time::Duration;

use super::model::Task;

impl Task {
    /// Leaf task that finishes after `interval` has elapsed in the
    /// `Executing` state, or sooner if cancelled mid-delay.
    #[must_use]
    pub fn delay(interval: Duration) -> Task {
        Task::from_fn("delay", move |ctx| async move {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = ctx.cancelled() => {}
            }
            ctx.finish(Vec::new());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskQueue;
    use std::time::Instant;

    #[tokio::test]
    async fn waits_out_the_interval() {
        let queue = TaskQueue::new();
        let task = Task::delay(Duration::from_millis(100));
        let started = Instant::now();
        queue.submit(&task).unwrap();
        task.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(task.errors().is_empty());
    }

    #[tokio::test]
    async fn cancellation_cuts_the_delay_short() {
        let queue = TaskQueue::new();
        let task = Task::delay(Duration::from_secs(30));
        queue.submit(&task).unwrap();
        while !task.is_executing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let cancelled_at = Instant::now();
        task.cancel();
        task.wait().await;
        assert!(cancelled_at.elapsed() < Duration::from_secs(5));
        assert!(task.is_cancelled());
    }
}
