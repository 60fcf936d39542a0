use spindle_api::ScriptError;
use thiserror::Error;

use crate::signal::SignalId;
use crate::task::TaskId;

/// Bookkeeping error returned synchronously by a scheduler call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("{0} does not exist or was destroyed")]
    UnknownSignal(SignalId),

    #[error("{0} is dead and cannot be suspended")]
    DeadTask(TaskId),

    #[error("{0} is already waiting on a delay")]
    AlreadyDelayed(TaskId),

    #[error("{0} is parked and cannot also be delayed")]
    DelayedWhileParked(TaskId),

    #[error("{0} is delayed and cannot also be parked")]
    ParkedWhileDelayed(TaskId),
}

impl SchedulerError {
    /// Name of the host function that rejected the call
    pub fn function(&self) -> &'static str {
        match self {
            SchedulerError::UnknownSignal(_) => "signal",
            SchedulerError::DeadTask(_) => "suspend",
            SchedulerError::AlreadyDelayed(_) | SchedulerError::DelayedWhileParked(_) => "delay",
            SchedulerError::ParkedWhileDelayed(_) => "park",
        }
    }
}

impl From<SchedulerError> for ScriptError {
    fn from(e: SchedulerError) -> Self {
        ScriptError::invalid_argument(e.function(), e.to_string())
    }
}
