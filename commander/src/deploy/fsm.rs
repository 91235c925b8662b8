//! Finite State Machine for a single deployment run

use serde::{Deserialize, Serialize};

/// Run state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Initial state, nothing executed
    Pending,

    /// Executing the step at this index
    Executing(usize),

    /// A step failed; remaining steps are skipped
    Aborted { at: usize },

    /// Running the finalize step
    Finalizing { success: bool },

    /// Every step succeeded
    Succeeded,

    /// The run failed
    Failed,
}

/// Run event
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Start executing the first step
    Begin,

    /// Current step completed successfully
    StepSucceeded,

    /// Current step (or finalize bookkeeping) failed
    StepFailed(String),

    /// Enter the finalize step
    Finalize,

    /// Finalize completed
    Finished,
}

/// Deployment run FSM
///
/// Strictly forward: step indexes only grow, and finalize is entered once.
#[derive(Debug, Clone)]
pub struct RunFsm {
    state: RunState,
    error: Option<String>,
}

impl RunFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: RunState::Pending,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, RunState::Aborted { .. })
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            // From Pending
            (RunState::Pending, RunEvent::Begin) => RunState::Executing(0),
            (RunState::Pending, RunEvent::Finalize) => RunState::Finalizing { success: true },

            // From Executing
            (RunState::Executing(index), RunEvent::StepSucceeded) => RunState::Executing(index + 1),
            (RunState::Executing(index), RunEvent::StepFailed(err)) => {
                self.error = Some(err.clone());
                RunState::Aborted { at: *index }
            }
            (RunState::Executing(_), RunEvent::Finalize) => RunState::Finalizing { success: true },

            // From Aborted
            (RunState::Aborted { .. }, RunEvent::Finalize) => RunState::Finalizing { success: false },

            // From Finalizing
            (RunState::Finalizing { .. }, RunEvent::StepFailed(err)) => {
                if self.error.is_none() {
                    self.error = Some(err.clone());
                }
                RunState::Finalizing { success: false }
            }
            (RunState::Finalizing { success }, RunEvent::Finished) => {
                if *success {
                    RunState::Succeeded
                } else {
                    RunState::Failed
                }
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}
