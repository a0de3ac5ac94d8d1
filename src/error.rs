use thiserror::Error;

/// Caller-visible error kinds (§7). Not every kind is reachable from every
/// component: `INSUFFICIENT` / `EVENT_PAST` / `CONFLICT` / `TIMEOUT` only
/// ever appear on an intent's terminal record, never synchronously.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    Forbidden,
    Unavailable,
    Insufficient,
    EventPast,
    Conflict,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::Insufficient => "INSUFFICIENT",
            ErrorKind::EventPast => "EVENT_PAST",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Error surfaced synchronously by Intake (§4.1, §7).
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("event not found: {0}")]
    NotFound(String),

    #[error("event unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntakeError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            IntakeError::NotFound(_) => ErrorKind::NotFound,
            IntakeError::Unavailable(_) => ErrorKind::Unavailable,
            IntakeError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Error surfaced synchronously by Cancellation (§4.5, §7).
#[derive(Error, Debug)]
pub enum CancellationError {
    #[error("intent not found: {0}")]
    NotFound(String),

    #[error("session mismatch")]
    Forbidden,

    #[error("intent not cancellable, current status: {0}")]
    NotCancellable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CancellationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CancellationError::NotFound(_) => ErrorKind::NotFound,
            CancellationError::Forbidden => ErrorKind::Forbidden,
            CancellationError::NotCancellable(_) => ErrorKind::Internal,
            CancellationError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// The Allocator's result (§4.2, §9): a closed sum type, not an exception
/// hierarchy. `Success` is the only variant that ever mutates inventory.
#[derive(Clone, Debug)]
pub enum AllocationOutcome {
    Success { ticket_ids: Vec<uuid::Uuid> },
    Insufficient,
    EventPast,
    Conflict,
    Timeout,
    Internal(String),
}

impl AllocationOutcome {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AllocationOutcome::Success { .. } => {
                unreachable!("kind() is only meaningful on failure variants")
            }
            AllocationOutcome::Insufficient => ErrorKind::Insufficient,
            AllocationOutcome::EventPast => ErrorKind::EventPast,
            AllocationOutcome::Conflict => ErrorKind::Conflict,
            AllocationOutcome::Timeout => ErrorKind::Timeout,
            AllocationOutcome::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the Processor should retry this outcome within its attempt
    /// budget (§4.3 step 3).
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocationOutcome::Conflict | AllocationOutcome::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_timeout_are_retryable() {
        assert!(AllocationOutcome::Conflict.is_retryable());
        assert!(AllocationOutcome::Timeout.is_retryable());
    }

    #[test]
    fn terminal_failures_are_not_retryable() {
        assert!(!AllocationOutcome::Insufficient.is_retryable());
        assert!(!AllocationOutcome::EventPast.is_retryable());
        assert!(!AllocationOutcome::Internal("boom".into()).is_retryable());
    }

    #[test]
    fn error_kind_strings_match_spec_tokens() {
        assert_eq!(ErrorKind::InvalidRequest.as_str(), "INVALID_REQUEST");
        assert_eq!(ErrorKind::EventPast.as_str(), "EVENT_PAST");
        assert_eq!(ErrorKind::Internal.as_str(), "INTERNAL");
    }
}
