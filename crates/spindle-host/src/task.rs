use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use spindle_api::{Args, ScriptError};

use crate::context::TaskContext;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// What a task body reports when it gives control back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task yielded and expects to be resumed later
    Suspended,
    /// The task ran to completion
    Finished,
}

/// Lifecycle of a task as tracked by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but not started, or yielded
    Suspended,
    /// Inside a call to [`Task::resume`]
    Running,
    /// Finished or failed; can never run again
    Dead,
}

/// A suspendable unit of execution
///
/// Each call to `resume` runs the task until it either finishes or yields.
/// To yield, a body registers itself through the [`TaskContext`] (for example
/// with [`TaskContext::delay`] or [`TaskContext::wait`]) and returns the
/// [`TaskStatus::Suspended`] those calls hand back. The next `resume` receives
/// the arguments of whatever woke it: nothing for a delay, the fire arguments
/// for a signal wait.
pub trait Task {
    fn resume(&mut self, cx: &mut TaskContext<'_>, args: Args) -> Result<TaskStatus, ScriptError>;
}

/// Task body backed by a closure, see [`from_fn`]
pub struct FnTask<F>(F);

impl<F> Task for FnTask<F>
where
    F: FnMut(&mut TaskContext<'_>, Args) -> Result<TaskStatus, ScriptError>,
{
    fn resume(&mut self, cx: &mut TaskContext<'_>, args: Args) -> Result<TaskStatus, ScriptError> {
        (self.0)(cx, args)
    }
}

/// Build a task body from a closure
///
/// The closure is called once per resumption and keeps whatever state it
/// captured between calls.
pub fn from_fn<F>(f: F) -> FnTask<F>
where
    F: FnMut(&mut TaskContext<'_>, Args) -> Result<TaskStatus, ScriptError>,
{
    FnTask(f)
}

struct TaskInner {
    id: TaskId,
    name: String,
    state: Cell<TaskState>,
    delayed: Cell<bool>,
    parked: Cell<u32>,
    body: RefCell<Box<dyn Task>>,
}

/// Shared reference to a task
///
/// Handles compare by identity: two handles are equal only if they refer to
/// the same task.
#[derive(Clone)]
pub struct TaskHandle(Rc<TaskInner>);

impl TaskHandle {
    pub(crate) fn new(id: TaskId, name: String, body: Box<dyn Task>) -> Self {
        Self(Rc::new(TaskInner {
            id,
            name,
            state: Cell::new(TaskState::Suspended),
            delayed: Cell::new(false),
            parked: Cell::new(0),
            body: RefCell::new(body),
        }))
    }

    pub fn id(&self) -> TaskId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn state(&self) -> TaskState {
        self.0.state.get()
    }

    pub fn is_dead(&self) -> bool {
        self.state() == TaskState::Dead
    }

    /// Whether the task currently sits in the delay queue
    pub fn is_delayed(&self) -> bool {
        self.0.delayed.get()
    }

    /// Number of parking lot entries currently held for this task
    pub fn parked_count(&self) -> u32 {
        self.0.parked.get()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.0.state.set(state);
    }

    pub(crate) fn set_delayed(&self, delayed: bool) {
        self.0.delayed.set(delayed);
    }

    pub(crate) fn add_parked(&self) {
        self.0.parked.set(self.0.parked.get() + 1);
    }

    pub(crate) fn remove_parked(&self) {
        self.0.parked.set(self.0.parked.get().saturating_sub(1));
    }

    /// Borrow the body for a resumption; fails if the task is already running
    pub(crate) fn try_body(&self) -> Option<RefMut<'_, Box<dyn Task>>> {
        self.0.body.try_borrow_mut().ok()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("state", &self.0.state.get())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn dummy_handle(raw: u64) -> TaskHandle {
    TaskHandle::new(
        TaskId::new(raw),
        format!("dummy-{}", raw),
        Box::new(from_fn(|_cx, _args| Ok(TaskStatus::Finished))),
    )
}
