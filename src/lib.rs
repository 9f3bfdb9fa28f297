//! Concurrent task scheduling with explicit dependency ordering,
//! asynchronous gating conditions, cooperative cancellation, dynamic
//! fan-out, composite groups, and bounded retry.
//!
//! A [`Task`] is a unit of schedulable work advancing through a strict
//! forward state machine; a [`TaskQueue`] owns the active set and a
//! worker pool, dispatching each task once its dependencies have
//! finished and its conditions have passed. Running work bodies may
//! emit further tasks at any time, and composite tasks
//! ([`Task::group`], [`Task::retrying`]) nest the same machinery.
//!
//! The scheduler knows nothing about what the work is: networking,
//! persistence, or rendering all live in the work bodies that callers
//! supply.
//!
//! ```no_run
//! use gantry::{Task, TaskQueue};
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = TaskQueue::new();
//!
//!     let fetch = Task::from_fn("fetch-page", |ctx| async move {
//!         // ... network call ...
//!         ctx.finish(Vec::new());
//!     });
//!     let decode = Task::from_fn("decode-page", |ctx| async move {
//!         // ... parse the response ...
//!         ctx.finish(Vec::new());
//!     });
//!     decode.add_dependency(&fetch).unwrap();
//!
//!     queue.submit(&fetch).unwrap();
//!     queue.submit(&decode).unwrap();
//!     decode.wait().await;
//! }
//! ```

pub mod condition;
pub mod error;
mod group;
pub mod logging;
pub mod observer;
pub mod queue;
mod retry;
pub mod task;

pub use condition::{ConditionOutcome, MutuallyExclusive, NoFailedDependencies, TaskCondition};
pub use error::{ErrorKind, QueueError, Result};
pub use observer::{BlockObserver, TaskObserver};
pub use queue::{QueueConfig, QueueStats, TaskQueue};
pub use task::{State, Task, TaskContext, TaskId, Work};
