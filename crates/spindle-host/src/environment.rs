use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use spindle_api::{Args, ScriptError, Value};
use tracing::{debug, error, trace, warn};

use crate::context::TaskContext;
use crate::delay_queue::DelayQueue;
use crate::error::SchedulerError;
use crate::parking_lot::{ParkingKey, ParkingLot};
use crate::signal::{Callback, Connection, SignalId, SignalRegistry};
use crate::task::{Task, TaskHandle, TaskId, TaskState, TaskStatus};

/// Counters describing what an environment has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvironmentStats {
    /// Calls to `update`
    pub ticks: u64,
    /// Task resumptions attempted, including failed ones
    pub resumptions: u64,
    /// Resumptions that ended in an error or a panic
    pub failures: u64,
    /// Signal fires
    pub fires: u64,
}

/// Scheduling authority for one scripting host
///
/// Owns the delay queue, the parking lot and every signal. All of it is
/// single threaded: tasks are resumed one at a time, and a resumed task gets
/// `&mut Environment` back through its [`TaskContext`] so it can suspend
/// again, fire signals or resume others.
#[derive(Debug, Default)]
pub struct Environment {
    delay_queue: DelayQueue,
    parking_lot: ParkingLot,
    signals: SignalRegistry,
    next_task_id: u64,
    stats: EnvironmentStats,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Tasks =====

    /// Wrap a body in a new, not yet started task
    pub fn create_task(&mut self, name: impl Into<String>, body: impl Task + 'static) -> TaskHandle {
        self.create_boxed_task(name.into(), Box::new(body))
    }

    /// Create a task and run it right away with `args`
    ///
    /// A failure on this first run is logged like any other resumption
    /// failure and also returned to the caller.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        body: impl Task + 'static,
        args: Args,
    ) -> Result<TaskHandle, ScriptError> {
        let task = self.create_task(name, body);
        debug!(target: "scripting", "Spawning {} ({})", task.name(), task.id());

        match self.resume(&task, args) {
            Ok(_) => Ok(task),
            Err(e) => {
                self.stats.failures += 1;
                error!(target: "scripting", "Task {} ({}) failed to start: {}", task.name(), task.id(), e);
                Err(e)
            }
        }
    }

    /// Run a task until it yields or finishes
    ///
    /// Panics inside the body are caught and returned as
    /// [`ScriptError::Panicked`]. A task that returns an error or panics is
    /// dead afterwards.
    pub fn resume(&mut self, task: &TaskHandle, args: Args) -> Result<TaskStatus, ScriptError> {
        if task.is_dead() {
            return Err(ScriptError::DeadTask);
        }

        let Some(mut body) = task.try_body() else {
            return Err(ScriptError::NotSuspended);
        };

        self.stats.resumptions += 1;
        task.set_state(TaskState::Running);
        trace!(target: "scripting", "Resuming {} ({}) with {} arg(s)", task.name(), task.id(), args.len());

        let mut cx = TaskContext::new(self, task.clone());
        let result = match panic::catch_unwind(AssertUnwindSafe(|| body.resume(&mut cx, args))) {
            Ok(result) => result,
            Err(payload) => Err(ScriptError::Panicked(panic_message(payload.as_ref()))),
        };
        drop(body);

        match &result {
            Ok(TaskStatus::Suspended) => task.set_state(TaskState::Suspended),
            Ok(TaskStatus::Finished) | Err(_) => task.set_state(TaskState::Dead),
        }

        result
    }

    /// Resume a task, logging and swallowing any failure
    fn resume_reported(&mut self, task: &TaskHandle, args: Args) {
        if let Err(e) = self.resume(task, args) {
            self.stats.failures += 1;
            error!(target: "scripting", "Task {} ({}) failed: {}", task.name(), task.id(), e);
        }
    }

    fn create_boxed_task(&mut self, name: String, body: Box<dyn Task>) -> TaskHandle {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        TaskHandle::new(id, name, body)
    }

    // ===== Time =====

    /// Advance the delay queue by `delta` seconds and resume every task now due
    ///
    /// Only entries queued before this call are advanced; tasks delayed by
    /// the resumptions made here wait for the next update.
    pub fn update(&mut self, delta: f64) {
        self.stats.ticks += 1;

        let due = self.delay_queue.advance(delta);
        if !due.is_empty() {
            trace!(target: "scripting", "{} delayed task(s) due", due.len());
        }

        for task in due {
            if task.state() == TaskState::Running {
                // It delayed itself and then drove this update from inside its own body
                self.delay_queue.schedule(task, 0.0);
                continue;
            }
            self.resume_reported(&task, Vec::new());
        }
    }

    /// Suspend `task` for `seconds`
    ///
    /// The task is resumed by the first `update` after the time has elapsed,
    /// never synchronously, even for a zero or negative duration.
    pub fn delay(&mut self, task: &TaskHandle, seconds: f64) -> Result<(), SchedulerError> {
        if task.is_dead() {
            return Err(SchedulerError::DeadTask(task.id()));
        }
        if task.is_delayed() {
            return Err(SchedulerError::AlreadyDelayed(task.id()));
        }
        if task.parked_count() > 0 {
            return Err(SchedulerError::DelayedWhileParked(task.id()));
        }

        self.delay_queue.schedule(task.clone(), seconds);
        Ok(())
    }

    /// Suspend `task` until the next update
    pub fn defer(&mut self, task: &TaskHandle) -> Result<(), SchedulerError> {
        self.delay(task, 0.0)
    }

    // ===== Parking =====

    /// Issue a fresh identity to park tasks on
    pub fn new_parking_key(&mut self) -> ParkingKey {
        self.parking_lot.new_key()
    }

    /// Suspend `task` until `key` is unparked
    pub fn park(&mut self, task: &TaskHandle, key: ParkingKey) -> Result<(), SchedulerError> {
        if task.is_dead() {
            return Err(SchedulerError::DeadTask(task.id()));
        }
        if task.is_delayed() {
            return Err(SchedulerError::ParkedWhileDelayed(task.id()));
        }

        self.parking_lot.park(task.clone(), key);
        Ok(())
    }

    /// Resume every task parked on `key` with no arguments
    ///
    /// Returns the number of tasks resumed.
    pub fn unpark(&mut self, key: ParkingKey) -> usize {
        self.unpark_with(key, &[])
    }

    /// Resume every task parked on `key`, each with its own copy of `args`
    ///
    /// Waiters are resumed in arrival order. Tasks that park on `key` while
    /// this batch runs are left for the next unpark, and so is a waiter that
    /// is still running because it is the one doing the unpark.
    pub fn unpark_with(&mut self, key: ParkingKey, args: &[Value]) -> usize {
        let waiters = self.parking_lot.take(key);
        let mut count = 0;

        for task in waiters {
            if task.state() == TaskState::Running {
                self.parking_lot.park(task, key);
                continue;
            }
            self.resume_reported(&task, args.to_vec());
            count += 1;
        }

        count
    }

    // ===== Signals =====

    pub fn create_signal(&mut self) -> SignalId {
        let key = self.parking_lot.new_key();
        self.signals.create(key, None)
    }

    /// Create a signal that scripts can find by name
    pub fn create_named_signal(&mut self, name: impl Into<String>) -> SignalId {
        let key = self.parking_lot.new_key();
        let name = name.into();
        let id = self.signals.create(key, Some(name.clone()));
        debug!(target: "scripting", "Created signal '{}' ({})", name, id);
        id
    }

    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.signals.lookup(name)
    }

    /// Destroy a signal and drop all of its listeners
    ///
    /// Tasks waiting on the signal are not resumed and stay parked for good.
    /// Returns how many were left behind.
    pub fn destroy_signal(&mut self, signal: SignalId) -> usize {
        let Some(key) = self.signals.destroy(signal) else {
            return 0;
        };

        let stranded = self.parking_lot.waiter_count(key);
        if stranded > 0 {
            warn!(
                target: "scripting",
                "Destroyed {} with {} task(s) still waiting on it; they will never resume",
                signal,
                stranded
            );
        }

        stranded
    }

    /// Register a listener invoked on every fire
    pub fn connect(&mut self, signal: SignalId, callback: Callback) -> Result<Connection, SchedulerError> {
        self.signals.connect(signal, callback)
    }

    /// Register a listener invoked on the next fire only
    pub fn once(&mut self, signal: SignalId, callback: Callback) -> Result<Connection, SchedulerError> {
        self.signals.connect_once(signal, callback)
    }

    /// Remove a listener; disconnecting twice is a no-op
    pub fn disconnect(&mut self, connection: Connection) {
        if self.signals.disconnect(connection) {
            trace!(target: "scripting", "Disconnected {} from {}", connection.id(), connection.signal());
        }
    }

    pub fn connected(&self, connection: Connection) -> bool {
        self.signals.is_connected(connection)
    }

    /// Suspend `task` until `signal` next fires
    pub fn wait(&mut self, task: &TaskHandle, signal: SignalId) -> Result<(), SchedulerError> {
        let key = self.signals.key(signal)?;
        self.park(task, key)
    }

    /// Fire a signal
    ///
    /// Every listener registered when the fire starts is invoked in its own
    /// task, in registration order, even if an earlier listener disconnects
    /// it. Then every task waiting on the signal is resumed with `args`.
    /// Failures of individual listeners and waiters are logged and do not
    /// stop the fire.
    pub fn fire(&mut self, signal: SignalId, args: &[Value]) -> Result<(), SchedulerError> {
        let (listeners, key) = self.signals.snapshot(signal)?;
        self.stats.fires += 1;
        trace!(
            target: "scripting",
            "Firing {} to {} listener(s) and {} waiter(s)",
            signal,
            listeners.len(),
            self.parking_lot.waiter_count(key)
        );

        for (connection, callback) in listeners {
            let task = self.create_boxed_task(format!("{} {}", signal, connection), callback.instantiate());
            self.resume_reported(&task, args.to_vec());
        }

        self.unpark_with(key, args);
        Ok(())
    }

    // ===== Introspection =====

    /// Number of tasks in the delay queue
    pub fn pending_delays(&self) -> usize {
        self.delay_queue.len()
    }

    /// Number of waiters parked on `key`
    pub fn parked_count(&self, key: ParkingKey) -> usize {
        self.parking_lot.waiter_count(key)
    }

    /// Number of waiters across every key
    pub fn total_parked(&self) -> usize {
        self.parking_lot.len()
    }

    /// Number of tasks waiting on `signal`
    pub fn waiting_on(&self, signal: SignalId) -> usize {
        self.signals
            .key(signal)
            .map_or(0, |key| self.parking_lot.waiter_count(key))
    }

    pub fn listener_count(&self, signal: SignalId) -> usize {
        self.signals.listener_count(signal)
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn stats(&self) -> EnvironmentStats {
        self.stats
    }

    /// True when no task will be resumed by `update` alone
    pub fn is_idle(&self) -> bool {
        self.delay_queue.is_empty()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
