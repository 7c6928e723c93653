//! Retry policy for scoring calls.
//!
//! This module encapsulates the failure taxonomy (malformed output, quota
//! rejections, timeouts), the per-attempt retry decision, and the guided
//! retry loop that feeds recovery guidance back into the next attempt.

mod error;
mod policy;
mod run;

pub use error::{ErrorKind, TaskError};
pub use policy::{RetryDecision, RetryPolicy};
pub use run::{run_with_retry, AttemptReport};
