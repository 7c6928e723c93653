//! Classified scoring-call error.

use thiserror::Error;

/// High-level classification of a failed scoring call.
///
/// Callers map transport errors, HTTP status codes, and body validation
/// failures into these kinds; the retry loop switches on the kind instead
/// of inspecting concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The call returned, but its output failed structural validation.
    Format,
    /// The backend rejected the call for exceeding its quota.
    Quota,
    /// The backend was unreachable or did not answer in time.
    Timeout,
    /// Any other failure.
    Unclassified,
}

impl ErrorKind {
    /// Kinds worth another attempt. Timeouts and unknown failures are
    /// surfaced immediately.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Format | ErrorKind::Quota)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Format => "malformed output",
            ErrorKind::Quota => "quota exceeded",
            ErrorKind::Timeout => "backend timeout",
            ErrorKind::Unclassified => "unclassified failure",
        };
        f.write_str(label)
    }
}

/// Error carried by a failed task outcome: a kind for retry decisions and
/// a human-readable message for the report.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    kind: ErrorKind,
    message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Quota, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Format.is_retryable());
        assert!(ErrorKind::Quota.is_retryable());
        assert!(!ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::Unclassified.is_retryable());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let e = TaskError::timeout("no response after 30s");
        assert_eq!(e.to_string(), "backend timeout: no response after 30s");
    }
}
