//! Task lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle of a task, in strict forward order.
///
/// A task only ever moves forward through these states. Cancellation is
/// a side-channel flag, not a state: a cancelled task still finishes
/// through `Finishing` like any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Constructed, not yet handed to a queue.
    Initialized,
    /// Submitted; waiting for every dependency to finish.
    Pending,
    /// Dependencies finished; conditions are being evaluated.
    EvaluatingConditions,
    /// All conditions satisfied; waiting for worker capacity.
    Ready,
    /// The work body is running (or has been handed to a worker).
    Executing,
    /// The single finish transition is in progress.
    Finishing,
    /// Terminal. Observers have been or are being notified.
    Finished,
}

impl State {
    /// Check if the state is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Finished)
    }

    /// Check whether a direct transition to `next` is legal.
    #[must_use]
    pub fn can_transition_to(self, next: State) -> bool {
        matches!(
            (self, next),
            (State::Initialized, State::Pending)
                | (State::Pending, State::EvaluatingConditions)
                | (State::EvaluatingConditions, State::Ready)
                | (State::Ready, State::Executing)
                | (State::Executing, State::Finishing)
                // Cancellation and condition failure skip execution.
                | (State::Pending, State::Finishing)
                | (State::EvaluatingConditions, State::Finishing)
                | (State::Ready, State::Finishing)
                | (State::Finishing, State::Finished)
        )
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Initialized => write!(f, "initialized"),
            State::Pending => write!(f, "pending"),
            State::EvaluatingConditions => write!(f, "evaluating_conditions"),
            State::Ready => write!(f, "ready"),
            State::Executing => write!(f, "executing"),
            State::Finishing => write!(f, "finishing"),
            State::Finished => write!(f, "finished"),
        }
    }
}
