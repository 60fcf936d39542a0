use std::collections::HashMap;
use std::fmt;

use crate::task::TaskHandle;

/// Opaque identity a task can park on
///
/// Keys are issued by [`ParkingLot::new_key`] and compare by the issued
/// value only, so two distinct keys never share waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParkingKey(u64);

impl fmt::Display for ParkingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key#{}", self.0)
    }
}

/// Tasks suspended until someone unparks the key they wait on
#[derive(Debug, Default)]
pub struct ParkingLot {
    waiters: HashMap<ParkingKey, Vec<TaskHandle>>,
    next_key: u64,
}

impl ParkingLot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a key no other caller has been given
    pub fn new_key(&mut self) -> ParkingKey {
        let key = ParkingKey(self.next_key);
        self.next_key += 1;
        key
    }

    /// Append a task to the key's waiters
    ///
    /// Parking the same task on the same key twice creates two entries.
    pub fn park(&mut self, task: TaskHandle, key: ParkingKey) {
        task.add_parked();
        self.waiters.entry(key).or_default().push(task);
    }

    /// Remove and return every waiter of `key`, in arrival order
    ///
    /// The key is left empty, so waiters parked while the returned batch is
    /// being resumed form a new batch.
    pub fn take(&mut self, key: ParkingKey) -> Vec<TaskHandle> {
        let waiters = self.waiters.remove(&key).unwrap_or_default();

        for task in &waiters {
            task.remove_parked();
        }

        waiters
    }

    /// Number of waiters registered under `key`
    pub fn waiter_count(&self, key: ParkingKey) -> usize {
        self.waiters.get(&key).map_or(0, Vec::len)
    }

    /// Number of waiters across every key
    pub fn len(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.values().all(Vec::is_empty)
    }
}
