//! Shared test support: milestone recording and bounded waits.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gantry::{ErrorKind, Task, TaskObserver};

/// Milestones a task reports through its observers, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Produced { parent: String, child: String },
    Finished { task: String, errors: usize },
}

/// Observer appending every milestone to a shared list.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn finish_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Finished { .. }))
            .count()
    }
}

impl TaskObserver for EventRecorder {
    fn task_did_start(&self, task: &Task) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Event::Started(task.name().to_string()));
    }

    fn task_did_produce(&self, task: &Task, produced: &Task) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Event::Produced {
                parent: task.name().to_string(),
                child: produced.name().to_string(),
            });
    }

    fn task_did_finish(&self, task: &Task, errors: &[ErrorKind]) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Event::Finished {
                task: task.name().to_string(),
                errors: errors.len(),
            });
    }
}

/// Wait for a task to finish, failing the test after ten seconds.
pub async fn wait_finished(task: &Task) {
    tokio::time::timeout(Duration::from_secs(10), task.wait())
        .await
        .expect("task did not finish in time");
}

/// Poll until `predicate` holds, failing the test after ten seconds.
pub async fn wait_until(predicate: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
