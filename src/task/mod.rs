//! Tasks: schedulable units of work.
//!
//! Task handle, state machine, work bodies, and the built-in leaf tasks.

mod block;
mod delay;
mod model;
mod state;
pub(crate) mod work;

pub use model::{Task, TaskId};
pub use state::State;
pub use work::{TaskContext, Work};
