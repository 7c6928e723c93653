//! Guided retry loop: admit, attempt, classify, repeat.

use crate::budget::BudgetTracker;

use super::error::{ErrorKind, TaskError};
use super::policy::{RetryDecision, RetryPolicy};

/// Final outcome of a retried call plus how many attempts it took.
#[derive(Debug)]
pub struct AttemptReport<T> {
    pub attempts: u32,
    pub result: Result<T, TaskError>,
}

/// Runs `attempt` until it succeeds or the policy says to stop.
///
/// Every attempt first blocks on budget admission for `cost`, then runs
/// with the guidance text accumulated from earlier malformed-output
/// failures (empty on the first attempt). Quota rejections push the
/// task's cost into the tracker before retrying, so the next admission
/// reflects what the backend actually charged. Timeouts and unknown
/// failures are returned as-is after the first attempt; an exhausted
/// retry budget returns the accumulated guidance as the error detail.
///
/// Retryable failures never escape this loop: the caller only ever sees
/// a success or a final, fatal error.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    budget: &BudgetTracker,
    cost: u64,
    mut attempt: F,
) -> AttemptReport<T>
where
    F: FnMut(&str) -> Result<T, TaskError>,
{
    let mut guidance = String::new();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        budget.await_admission(cost);
        match attempt(&guidance) {
            Ok(value) => {
                return AttemptReport {
                    attempts,
                    result: Ok(value),
                }
            }
            Err(err) => {
                if err.kind() == ErrorKind::Format {
                    guidance = grow_guidance(&guidance, &err);
                }
                match policy.decide(attempts, err.kind()) {
                    RetryDecision::NoRetry => {
                        let result = if err.kind() == ErrorKind::Format {
                            Err(TaskError::format(guidance))
                        } else {
                            Err(err)
                        };
                        return AttemptReport { attempts, result };
                    }
                    RetryDecision::Retry => {
                        if err.kind() == ErrorKind::Quota {
                            tracing::debug!(
                                cost,
                                "backend reported quota violation; resynchronizing window"
                            );
                            budget.push_external_cost(cost);
                        }
                    }
                }
            }
        }
    }
}

/// Extend the recovery guidance after a malformed-output failure. The
/// first failure gets a generic warning; later failures append the error
/// detail so the backend can see what it got wrong.
fn grow_guidance(current: &str, err: &TaskError) -> String {
    if current.is_empty() {
        "Be very careful with the output formatting.".to_string()
    } else {
        format!(
            "{current} The previous output failed validation ({}); do not repeat this mistake.",
            err.message()
        )
    }
}
