//! Host runtime for suspending and resuming script tasks
//!
//! Scripts run as cooperative tasks on a single thread. A task suspends itself
//! by registering with the [`Environment`] (a time delay, a parking key or a
//! signal) and returning [`TaskStatus::Suspended`]. The host resumes it later,
//! either from [`Environment::update`] once its delay has elapsed or when the
//! key it parked on is unparked, for example by a signal fire.

pub mod context;
pub mod delay_queue;
pub mod environment;
pub mod error;
pub mod loader;
pub mod parking_lot;
pub mod script;
pub mod signal;
pub mod task;

pub use context::TaskContext;
pub use delay_queue::DelayQueue;
pub use environment::{Environment, EnvironmentStats};
pub use error::SchedulerError;
pub use loader::load_scripts;
pub use parking_lot::{ParkingKey, ParkingLot};
pub use script::{ScriptFile, Step, StepScript, run_script};
pub use signal::{Callback, Connection, ConnectionId, SignalId, SignalRegistry};
pub use task::{FnTask, Task, TaskHandle, TaskId, TaskState, TaskStatus};

pub use spindle_api::{Args, ScriptError, Value};
