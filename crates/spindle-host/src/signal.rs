use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use spindle_api::{Args, ScriptError};
use tracing::debug;

use crate::context::TaskContext;
use crate::error::SchedulerError;
use crate::parking_lot::ParkingKey;
use crate::task::{Task, TaskStatus, from_fn};

/// Unique identifier for a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signal#{}", self.0)
    }
}

/// Unique identifier for a listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}

/// Handle to one listener's registration on one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    id: ConnectionId,
    signal: SignalId,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The signal this connection belongs to
    pub fn signal(&self) -> SignalId {
        self.signal
    }
}

/// A signal listener
///
/// Every invocation builds a fresh task body, so a listener that suspends
/// runs in its own task and does not hold up the rest of the fire.
#[derive(Clone)]
pub struct Callback {
    make: Rc<dyn Fn() -> Box<dyn Task>>,
}

impl Callback {
    /// Listener whose body is produced by `make` on every invocation
    pub fn new<F, T>(make: F) -> Self
    where
        F: Fn() -> T + 'static,
        T: Task + 'static,
    {
        Self {
            make: Rc::new(move || Box::new(make()) as Box<dyn Task>),
        }
    }

    /// Listener backed by a shared closure
    ///
    /// The closure is called once per invocation with the fire arguments.
    /// Whatever status it returns is the status of that invocation's task.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>, Args) -> Result<TaskStatus, ScriptError> + 'static,
    {
        let f = Rc::new(f);
        Self::new(move || {
            let f = Rc::clone(&f);
            from_fn(move |cx, args| f(cx, args))
        })
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Task> {
        (self.make)()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// Body of a `once` listener: disconnects, then runs the wrapped callback
///
/// Every fire builds a new body, but they all share `fired`. A fire whose
/// snapshot was taken before a nested fire consumed the listener finds it set
/// and does nothing.
struct OnceListener {
    connection: Connection,
    fired: Rc<Cell<bool>>,
    inner: Box<dyn Task>,
    started: bool,
}

impl Task for OnceListener {
    fn resume(&mut self, cx: &mut TaskContext<'_>, args: Args) -> Result<TaskStatus, ScriptError> {
        if !self.started {
            self.started = true;
            if self.fired.replace(true) {
                return Ok(TaskStatus::Finished);
            }
            // Must happen before the callback runs so a re-entrant fire cannot reach it
            cx.env().disconnect(self.connection);
        }

        self.inner.resume(cx, args)
    }
}

#[derive(Debug)]
struct SignalState {
    name: Option<String>,
    key: ParkingKey,
    listeners: Vec<(ConnectionId, Callback)>,
}

/// Listener bookkeeping for every live signal
///
/// Tasks waiting on a signal are not stored here; they sit in the parking
/// lot under the signal's key.
#[derive(Debug, Default)]
pub struct SignalRegistry {
    signals: HashMap<SignalId, SignalState>,
    names: HashMap<String, SignalId>,
    next_signal: u64,
    next_connection: u64,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new signal whose waiters park on `key`
    ///
    /// A name makes the signal reachable through [`SignalRegistry::lookup`].
    /// Reusing a name rebinds it to the new signal.
    pub fn create(&mut self, key: ParkingKey, name: Option<String>) -> SignalId {
        let id = SignalId(self.next_signal);
        self.next_signal += 1;

        if let Some(name) = &name {
            if let Some(previous) = self.names.insert(name.clone(), id) {
                debug!(target: "scripting", "Signal name '{}' rebound from {} to {}", name, previous, id);
            }
        }

        self.signals.insert(
            id,
            SignalState {
                name,
                key,
                listeners: Vec::new(),
            },
        );
        id
    }

    /// Forget a signal and all its listeners
    ///
    /// Returns the parking key its waiters were using, if the signal existed.
    pub fn destroy(&mut self, id: SignalId) -> Option<ParkingKey> {
        let state = self.signals.remove(&id)?;

        if let Some(name) = state.name {
            if self.names.get(&name) == Some(&id) {
                self.names.remove(&name);
            }
        }

        Some(state.key)
    }

    /// Find a live signal by name
    pub fn lookup(&self, name: &str) -> Option<SignalId> {
        self.names.get(name).copied()
    }

    /// Parking key used by tasks waiting on the signal
    pub fn key(&self, id: SignalId) -> Result<ParkingKey, SchedulerError> {
        self.signals
            .get(&id)
            .map(|s| s.key)
            .ok_or(SchedulerError::UnknownSignal(id))
    }

    /// Append a persistent listener
    pub fn connect(
        &mut self,
        signal: SignalId,
        callback: Callback,
    ) -> Result<Connection, SchedulerError> {
        let connection = self.next_connection(signal)?;
        self.push_listener(connection, callback);
        Ok(connection)
    }

    /// Append a listener that disconnects itself the first time it is invoked
    pub fn connect_once(
        &mut self,
        signal: SignalId,
        callback: Callback,
    ) -> Result<Connection, SchedulerError> {
        let connection = self.next_connection(signal)?;
        let fired = Rc::new(Cell::new(false));

        let wrapper = Callback::new(move || OnceListener {
            connection,
            fired: Rc::clone(&fired),
            inner: callback.instantiate(),
            started: false,
        });

        self.push_listener(connection, wrapper);
        Ok(connection)
    }

    /// Remove a listener; returns false if it was already gone
    pub fn disconnect(&mut self, connection: Connection) -> bool {
        let Some(state) = self.signals.get_mut(&connection.signal) else {
            return false;
        };

        match state
            .listeners
            .iter()
            .position(|(id, _)| *id == connection.id)
        {
            Some(index) => {
                state.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether the listener is still registered
    pub fn is_connected(&self, connection: Connection) -> bool {
        self.signals
            .get(&connection.signal)
            .is_some_and(|s| s.listeners.iter().any(|(id, _)| *id == connection.id))
    }

    /// Copy of the listener list in registration order, plus the waiters' key
    pub fn snapshot(
        &self,
        signal: SignalId,
    ) -> Result<(Vec<(ConnectionId, Callback)>, ParkingKey), SchedulerError> {
        let state = self
            .signals
            .get(&signal)
            .ok_or(SchedulerError::UnknownSignal(signal))?;

        Ok((state.listeners.clone(), state.key))
    }

    pub fn listener_count(&self, signal: SignalId) -> usize {
        self.signals.get(&signal).map_or(0, |s| s.listeners.len())
    }

    /// Number of live signals
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    fn next_connection(&mut self, signal: SignalId) -> Result<Connection, SchedulerError> {
        if !self.signals.contains_key(&signal) {
            return Err(SchedulerError::UnknownSignal(signal));
        }

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        Ok(Connection { id, signal })
    }

    fn push_listener(&mut self, connection: Connection, callback: Callback) {
        if let Some(state) = self.signals.get_mut(&connection.signal) {
            state.listeners.push((connection.id, callback));
        }
    }
}
