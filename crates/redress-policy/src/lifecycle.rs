//! Complaint lifecycle graph.
//!
//! ```text
//! Submitted -> In Review -> In Progress -> Resolved -> Closed
//!                  \            ^  \
//!                   v           |   v
//!                   Escalated --+   (Escalated returns to In Progress
//!                                    once acknowledged)
//! ```
//!
//! `Submitted` is the sole initial state; `Closed` has no outgoing edges.

use redress_types::models::Status;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition { from: Status, to: Status },

    #[error("complaint is closed")]
    TerminalState,
}

/// Every complaint starts here, atomically with its first history entry.
pub const INITIAL: Status = Status::Submitted;

/// Direct successors of `status`. No skipping: a complaint reaches
/// `Resolved` only through `In Progress`.
pub fn successors(status: Status) -> &'static [Status] {
    match status {
        Status::Submitted => &[Status::InReview],
        Status::InReview => &[Status::InProgress, Status::Escalated],
        Status::InProgress => &[Status::Resolved, Status::Escalated],
        Status::Escalated => &[Status::InProgress],
        Status::Resolved => &[Status::Closed],
        Status::Closed => &[],
    }
}

pub fn is_terminal(status: Status) -> bool {
    matches!(status, Status::Closed)
}

/// Validate one edge of the graph. Pure: the caller applies the change (and
/// the matching history append) in a single atomic unit.
pub fn validate_transition(current: Status, next: Status) -> Result<(), TransitionError> {
    if is_terminal(current) {
        return Err(TransitionError::TerminalState);
    }
    if successors(current).contains(&next) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition {
            from: current,
            to: next,
        })
    }
}
