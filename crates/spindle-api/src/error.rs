use thiserror::Error;

/// Error raised while a task runs
///
/// These are reported by the scheduler and never propagate out of a tick,
/// an unpark batch or a signal fire.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// Error raised by script code
    #[error("{0}")]
    Runtime(String),

    /// Bad argument passed to a host function
    #[error("invalid argument to '{function}': {message}")]
    InvalidArgument {
        function: &'static str,
        message: String,
    },

    /// Attempt to resume a task that already finished or failed
    #[error("cannot resume dead task")]
    DeadTask,

    /// Attempt to resume a task that is currently running
    #[error("cannot resume non-suspended task")]
    NotSuspended,

    /// The task body panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl ScriptError {
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }

    pub fn invalid_argument(function: &'static str, message: impl Into<String>) -> Self {
        ScriptError::InvalidArgument {
            function,
            message: message.into(),
        }
    }
}
