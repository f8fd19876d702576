//! Stateless movement validation policy
//!
//! The validator knows nothing about identity or rate limiting: it judges a
//! proposed position change purely against the mover's current position,
//! the other occupants, and the current grid bounds. It serves both
//! self-initiated moves and operator moves of another participant, so it
//! must not assume the mover is the acting connection.

use shared::{GridSize, Position, MOVE_BUDGET};

/// Outcome of validating a single proposed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDecision {
    Accept,
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Manhattan distance exceeds the fixed per-request movement budget.
    OutOfRange,
    /// Another occupant already holds the destination square.
    Occupied,
    /// Destination lies outside the current grid.
    OutOfBounds,
}

/// Validates a proposed move. `occupants` must exclude the mover's own
/// current position. Rules are evaluated in order: range, occupancy, bounds.
pub fn validate(
    current: Position,
    proposed: Position,
    occupants: &[Position],
    grid: GridSize,
) -> MoveDecision {
    if current.manhattan_distance(&proposed) > MOVE_BUDGET {
        return MoveDecision::Reject(RejectReason::OutOfRange);
    }

    if occupants.iter().any(|occupied| *occupied == proposed) {
        return MoveDecision::Reject(RejectReason::Occupied);
    }

    if !grid.contains(&proposed) {
        return MoveDecision::Reject(RejectReason::OutOfBounds);
    }

    MoveDecision::Accept
}
