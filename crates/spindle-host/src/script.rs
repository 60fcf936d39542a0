//! Step scripts: small TOML-defined task bodies
//!
//! A step script is a list of operations run in order. Operations that
//! suspend (`delay`, `defer`, `wait`) yield the task, and the next resumption
//! continues with the following step.
//!
//! ```toml
//! id = "greeter"
//!
//! [[steps]]
//! op = "wait"
//! signal = "event"
//!
//! [[steps]]
//! op = "log"
//! message = "event fired with {args}"
//! ```

use std::path::Path;
use std::rc::Rc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use spindle_api::value::display_args;
use spindle_api::{Args, ScriptError, Value};
use tracing::info;

use crate::context::TaskContext;
use crate::environment::Environment;
use crate::signal::Callback;
use crate::task::{Task, TaskHandle, TaskStatus};

/// One operation of a step script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Log a message; `{args}` expands to the last resumption's arguments
    Log { message: String },
    /// Suspend for a number of seconds
    Delay { seconds: f64 },
    /// Suspend until the next update
    Defer,
    /// Suspend until the named signal fires
    Wait { signal: String },
    /// Fire the named signal
    Fire {
        signal: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Run `steps` in a new task every time the signal fires
    Connect { signal: String, steps: Vec<Step> },
    /// Run `steps` in a new task the next time the signal fires
    Once { signal: String, steps: Vec<Step> },
    /// Raise a script error
    Error { message: String },
}

/// A script as loaded from disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFile {
    /// Unique identifier for this script (e.g., "hello_world")
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Whether the script should run when loaded
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_enabled() -> bool {
    true
}

impl ScriptFile {
    /// Parse a script from TOML source
    pub fn parse(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("Failed to parse script")
    }

    /// Load a script from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::parse(&source).with_context(|| format!("Invalid script {}", path.display()))
    }

    /// Name if set, id otherwise
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Task body that runs a list of steps
pub struct StepScript {
    name: Rc<str>,
    steps: Rc<[Step]>,
    pc: usize,
    last_args: Args,
}

impl StepScript {
    pub fn new(name: impl Into<Rc<str>>, steps: impl Into<Rc<[Step]>>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into(),
            pc: 0,
            last_args: Vec::new(),
        }
    }

    /// Listener that runs `steps` in a fresh script on every invocation
    fn listener(&self, steps: &[Step]) -> Callback {
        let name: Rc<str> = format!("{}:listener", self.name).into();
        let steps: Rc<[Step]> = steps.into();
        Callback::new(move || StepScript::new(Rc::clone(&name), Rc::clone(&steps)))
    }
}

impl Task for StepScript {
    fn resume(&mut self, cx: &mut TaskContext<'_>, args: Args) -> Result<TaskStatus, ScriptError> {
        self.last_args = args;
        let steps = Rc::clone(&self.steps);

        while let Some(step) = steps.get(self.pc) {
            self.pc += 1;

            match step {
                Step::Log { message } => {
                    let message = message.replace("{args}", &display_args(&self.last_args));
                    info!(target: "script", script = %self.name, "{}", message);
                }
                Step::Delay { seconds } => return cx.delay(*seconds),
                Step::Defer => return cx.defer(),
                Step::Wait { signal } => {
                    let signal = cx.signal(signal)?;
                    return cx.wait(signal);
                }
                Step::Fire { signal, args } => {
                    let signal = cx.signal(signal)?;
                    cx.fire(signal, args)?;
                }
                Step::Connect { signal, steps } => {
                    let signal = cx.signal(signal)?;
                    let callback = self.listener(steps);
                    cx.env().connect(signal, callback)?;
                }
                Step::Once { signal, steps } => {
                    let signal = cx.signal(signal)?;
                    let callback = self.listener(steps);
                    cx.env().once(signal, callback)?;
                }
                Step::Error { message } => return Err(ScriptError::runtime(message.clone())),
            }
        }

        Ok(TaskStatus::Finished)
    }
}

/// Start a loaded script as a new task
pub fn run_script(env: &mut Environment, script: &ScriptFile) -> Result<TaskHandle, ScriptError> {
    let body = StepScript::new(script.id.as_str(), script.steps.clone());
    env.spawn(script.display_name(), body, Vec::new())
}
