use super::error::ErrorKind;

/// Decision returned by the retry policy for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not attempt again; surface the failure.
    NoRetry,
    /// Run another attempt.
    Retry,
}

/// Bounded retry policy for one scoring call.
///
/// Malformed output and quota rejections are retried until the attempt
/// budget runs out; timeouts and unknown failures are never retried. The
/// next attempt's admission against the cost window is the only extra
/// consumption a retry causes.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 7 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Decide whether to run another attempt. `attempt` is 1-based
    /// (1 = first attempt).
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        if kind.is_retryable() {
            RetryDecision::Retry
        } else {
            RetryDecision::NoRetry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_never_retry() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorKind::Timeout), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorKind::Unclassified), RetryDecision::NoRetry);
    }

    #[test]
    fn retryable_kinds_retry_until_attempts_exhausted() {
        let p = RetryPolicy::new(3);
        assert_eq!(p.decide(1, ErrorKind::Format), RetryDecision::Retry);
        assert_eq!(p.decide(2, ErrorKind::Quota), RetryDecision::Retry);
        assert_eq!(p.decide(3, ErrorKind::Format), RetryDecision::NoRetry);
    }

    #[test]
    fn at_least_one_attempt() {
        let p = RetryPolicy::new(0);
        assert_eq!(p.max_attempts, 1);
    }
}
