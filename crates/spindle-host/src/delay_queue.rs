use crate::task::TaskHandle;

/// A task waiting for time to pass
#[derive(Debug)]
struct DelayEntry {
    task: TaskHandle,
    /// Seconds left before the task is due
    remaining: f64,
}

/// Holds tasks suspended for a fixed number of seconds
///
/// The queue does not resume anything itself. [`DelayQueue::advance`] hands
/// back the tasks that became due and the environment resumes them after the
/// queue has been updated, so tasks delayed again while those resumptions run
/// land in the queue for the next tick.
#[derive(Debug, Default)]
pub struct DelayQueue {
    entries: Vec<DelayEntry>,
}

impl DelayQueue {
    /// Create an empty delay queue
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a task that becomes due after `seconds`
    ///
    /// Non-positive and NaN durations are due on the next call to `advance`.
    pub fn schedule(&mut self, task: TaskHandle, seconds: f64) {
        let remaining = if seconds > 0.0 { seconds } else { 0.0 };
        task.set_delayed(true);
        self.entries.push(DelayEntry { task, remaining });
    }

    /// Subtract `delta` seconds from every entry and remove the ones now due
    ///
    /// Due tasks are returned in the order they were scheduled; the relative
    /// order of the entries left behind is unchanged. Negative and NaN deltas
    /// count as zero.
    pub fn advance(&mut self, delta: f64) -> Vec<TaskHandle> {
        let delta = if delta > 0.0 { delta } else { 0.0 };
        let mut due = Vec::new();

        self.entries.retain_mut(|entry| {
            entry.remaining -= delta;

            if entry.remaining <= 0.0 {
                entry.task.set_delayed(false);
                due.push(entry.task.clone());
                false
            } else {
                true
            }
        });

        due
    }

    /// Seconds left for the given task, if it is queued
    pub fn remaining(&self, task: &TaskHandle) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.task == *task)
            .map(|entry| entry.remaining)
    }

    /// Get the number of queued tasks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
