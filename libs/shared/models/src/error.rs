use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Why a candidate interval cannot be booked.
///
/// Variants are listed in the order the conflict detector evaluates them;
/// callers surface the reason to the end user, so the first failing check
/// is the one returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    OutsideWorkingHours,
    OnApprovedLeave,
    DuringBreak,
    OverlapsBooking { booking_id: Uuid },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::OutsideWorkingHours => write!(f, "outside working hours"),
            ConflictReason::OnApprovedLeave => write!(f, "provider is on approved leave"),
            ConflictReason::DuringBreak => write!(f, "falls within a scheduled break"),
            ConflictReason::OverlapsBooking { booking_id } => {
                write!(f, "overlaps existing booking {}", booking_id)
            }
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulingError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("booking conflict: {0}")]
    Conflict(ConflictReason),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SchedulingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SchedulingError::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SchedulingError::Validation(message.into())
    }

    /// Conflicts and timeouts are actionable and safe to retry or re-route;
    /// validation and not-found failures are terminal for the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulingError::Conflict(_) | SchedulingError::Timeout(_)
        )
    }
}
