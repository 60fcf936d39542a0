//! Script-facing types for spindle
//!
//! This crate holds the values passed between scripts and the host when a task
//! is resumed or a signal fires, and the error type a task reports back to the
//! scheduler. It has no scheduler logic of its own so script bodies can depend
//! on it without pulling in the host.

pub mod error;
pub mod value;

pub use error::ScriptError;
pub use value::{Args, Value};
