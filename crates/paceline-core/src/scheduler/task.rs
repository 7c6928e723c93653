//! Task and outcome types for the batch scheduler.

use crate::retry::TaskError;

/// One attempt of a task's work: receives the current recovery guidance
/// (empty on the first attempt) and returns the opaque result or a
/// classified failure.
pub(super) type AttemptFn<T> = Box<dyn FnMut(&str) -> Result<T, TaskError> + Send>;

/// A registered unit of work. Immutable after registration; runs on
/// exactly one worker.
pub(super) struct Task<T> {
    pub(super) label: String,
    pub(super) cost: u64,
    pub(super) work: AttemptFn<T>,
}

/// Final result of one task, failures included. A batch returns exactly
/// one of these per registered task.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    /// Caller-supplied identity (e.g. a file path).
    pub label: String,
    /// Declared cost the task was admitted under.
    pub cost: u64,
    /// Attempts the retry loop consumed.
    pub attempts: u32,
    /// The opaque success value, or the final classified error.
    pub outcome: Result<T, TaskError>,
}
