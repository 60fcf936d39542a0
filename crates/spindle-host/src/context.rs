use spindle_api::{ScriptError, Value};

use crate::environment::Environment;
use crate::parking_lot::ParkingKey;
use crate::signal::SignalId;
use crate::task::{TaskHandle, TaskStatus};

/// Context handed to a task body for the duration of one resumption
///
/// It carries the environment that resumed the task and the task's own
/// handle, so the body can suspend itself or reach the rest of the host.
pub struct TaskContext<'a> {
    env: &'a mut Environment,
    task: TaskHandle,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(env: &'a mut Environment, task: TaskHandle) -> Self {
        Self { env, task }
    }

    /// Handle of the task being resumed
    pub fn task(&self) -> &TaskHandle {
        &self.task
    }

    /// The environment that resumed this task
    pub fn env(&mut self) -> &mut Environment {
        self.env
    }

    // ===== Suspension =====
    //
    // Each of these registers the current task and returns the status the
    // body should return to actually yield: `return cx.delay(1.0);`

    /// Suspend for `seconds`, resuming with no arguments
    pub fn delay(&mut self, seconds: f64) -> Result<TaskStatus, ScriptError> {
        self.env.delay(&self.task, seconds)?;
        Ok(TaskStatus::Suspended)
    }

    /// Suspend until the next update
    pub fn defer(&mut self) -> Result<TaskStatus, ScriptError> {
        self.env.defer(&self.task)?;
        Ok(TaskStatus::Suspended)
    }

    /// Suspend until `key` is unparked
    pub fn park(&mut self, key: ParkingKey) -> Result<TaskStatus, ScriptError> {
        self.env.park(&self.task, key)?;
        Ok(TaskStatus::Suspended)
    }

    /// Suspend until `signal` next fires, resuming with the fire arguments
    pub fn wait(&mut self, signal: SignalId) -> Result<TaskStatus, ScriptError> {
        self.env.wait(&self.task, signal)?;
        Ok(TaskStatus::Suspended)
    }

    // ===== Signals =====

    /// Look up a global signal by name
    pub fn signal(&self, name: &str) -> Result<SignalId, ScriptError> {
        self.env
            .find_signal(name)
            .ok_or_else(|| ScriptError::runtime(format!("'{}' is not a valid signal", name)))
    }

    /// Fire a signal from inside a task
    pub fn fire(&mut self, signal: SignalId, args: &[Value]) -> Result<(), ScriptError> {
        self.env.fire(signal, args)?;
        Ok(())
    }
}
