//! Session registry: the single source of truth for participant state
//!
//! This module owns the mapping from connection id to participant record,
//! including join validation (emoji uniqueness against the catalog), guest
//! handling, movement application composed with the per-connection
//! debounce, and removal on disconnect. Every mutating call reports
//! whether observable state changed so the caller can decide what to
//! re-broadcast; the registry itself never performs I/O.

use crate::movement::{self, MoveDecision, RejectReason};
use log::info;
use shared::{
    Appearance, GridSize, Participant, Position, GUEST_POSITION, MOVE_COOLDOWN_MS, SPAWN_POSITION,
};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Emoji tokens offered when no catalog is configured.
pub const DEFAULT_EMOJIS: &[&str] = &["🤖", "🧙‍♂️", "🥷", "🐺", "😺"];

/// Why a `pickUser` request was refused. Surfaced to the originating
/// connection as an `emojiError` reason string; the participant is left
/// unjoined and must retry.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    #[error("display name must not be empty")]
    EmptyName,
    #[error("emoji already taken")]
    AppearanceConflict,
    #[error("emoji invalid and no image supplied")]
    AppearanceInvalid,
}

/// Raw appearance fields from a `pickUser` request, before resolution
/// into a closed [`Appearance`] variant.
#[derive(Debug, Clone, Default)]
pub struct AppearanceRequest {
    pub emoji: Option<String>,
    pub image: Option<String>,
}

/// Result of a movement request against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Position updated; the caller should re-broadcast the snapshot.
    Applied,
    /// Dropped by the per-connection cooldown. No state change, no reply.
    Throttled,
    /// Refused by the movement validator. Silent no-op.
    Rejected(RejectReason),
    /// Target is a guest and has no board presence.
    NoBoardPresence,
    /// Target connection has no registered participant.
    UnknownParticipant,
}

impl MoveOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, MoveOutcome::Applied)
    }
}

/// One registered participant plus server-internal bookkeeping that never
/// crosses the wire.
#[derive(Debug)]
struct Session {
    participant: Participant,
    last_move: Option<Instant>,
}

/// Registry of all live participants, keyed by connection id
///
/// Owned exclusively by the dispatch loop. The registry validates joins
/// against the emoji catalog and applies movement under the no-overlap and
/// range rules; callers trigger broadcasts based on the returned outcomes.
pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    catalog: Vec<String>,
    cooldown: Duration,
}

impl SessionRegistry {
    pub fn new(catalog: Vec<String>) -> Self {
        Self {
            sessions: HashMap::new(),
            catalog,
            cooldown: Duration::from_millis(MOVE_COOLDOWN_MS),
        }
    }

    pub fn with_default_catalog() -> Self {
        Self::new(DEFAULT_EMOJIS.iter().map(|token| token.to_string()).collect())
    }

    /// Allowed emoji tokens, fixed at startup.
    pub fn emoji_catalog(&self) -> &[String] {
        &self.catalog
    }

    /// Registers a participant for `conn_id` with a chosen appearance.
    ///
    /// Resolution follows the request fields in order: a supplied emoji
    /// wins if it is in the catalog and unclaimed; otherwise a supplied
    /// image is accepted unconditionally; otherwise the join fails. A
    /// repeated join replaces the existing record and resets the position
    /// to the spawn point.
    pub fn join(
        &mut self,
        conn_id: u32,
        name: &str,
        request: AppearanceRequest,
    ) -> Result<Participant, JoinError> {
        if name.trim().is_empty() {
            return Err(JoinError::EmptyName);
        }

        let appearance = match request {
            AppearanceRequest {
                emoji: Some(token),
                image,
            } => {
                if self.emoji_available(&token) {
                    Appearance::Emoji(token)
                } else if let Some(blob) = image {
                    Appearance::Image(blob)
                } else if self.catalog.contains(&token) {
                    return Err(JoinError::AppearanceConflict);
                } else {
                    return Err(JoinError::AppearanceInvalid);
                }
            }
            AppearanceRequest {
                emoji: None,
                image: Some(blob),
            } => Appearance::Image(blob),
            AppearanceRequest {
                emoji: None,
                image: None,
            } => return Err(JoinError::AppearanceInvalid),
        };

        let participant = Participant {
            name: name.to_string(),
            appearance,
            position: SPAWN_POSITION,
        };

        info!("Participant {} joined as connection {}", name, conn_id);
        self.sessions.insert(
            conn_id,
            Session {
                participant: participant.clone(),
                last_move: None,
            },
        );

        Ok(participant)
    }

    /// Registers a guest for `conn_id`. Always succeeds; the guest gets a
    /// synthesized name and the off-board sentinel position, so they can
    /// observe and chat but never occupy a square.
    pub fn join_as_guest(&mut self, conn_id: u32) -> Participant {
        let participant = Participant {
            name: format!("Guest_{}", conn_id),
            appearance: Appearance::Guest,
            position: GUEST_POSITION,
        };

        info!("Guest connected as connection {}", conn_id);
        self.sessions.insert(
            conn_id,
            Session {
                participant: participant.clone(),
                last_move: None,
            },
        );

        participant
    }

    /// Removes the participant for `conn_id`, if any. Idempotent; returns
    /// true if a participant was actually removed.
    pub fn leave(&mut self, conn_id: u32) -> bool {
        if let Some(session) = self.sessions.remove(&conn_id) {
            info!(
                "Participant {} left (connection {})",
                session.participant.name, conn_id
            );
            true
        } else {
            false
        }
    }

    pub fn get(&self, conn_id: u32) -> Option<&Participant> {
        self.sessions.get(&conn_id).map(|session| &session.participant)
    }

    /// Current membership, ordered by connection id. This is exactly the
    /// content of every `usersUpdate` broadcast.
    pub fn snapshot(&self) -> BTreeMap<u32, Participant> {
        self.sessions
            .iter()
            .map(|(id, session)| (*id, session.participant.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Applies a self-initiated move, composing the per-connection
    /// debounce with the movement validator. The debounce timestamp
    /// advances on every non-throttled attempt, accepted or rejected.
    pub fn move_self(
        &mut self,
        conn_id: u32,
        proposed: Position,
        grid: GridSize,
        now: Instant,
    ) -> MoveOutcome {
        let Some(session) = self.sessions.get_mut(&conn_id) else {
            return MoveOutcome::UnknownParticipant;
        };

        if session.participant.appearance.is_guest() {
            return MoveOutcome::NoBoardPresence;
        }

        if let Some(last) = session.last_move {
            if now.duration_since(last) < self.cooldown {
                return MoveOutcome::Throttled;
            }
        }
        session.last_move = Some(now);

        self.apply_validated_move(conn_id, proposed, grid)
    }

    /// Applies an operator-initiated move of another participant. Same
    /// validation rules as a self-move, but no cooldown: the debounce is a
    /// per-connection concern and the acting connection is not the target.
    pub fn move_by_operator(
        &mut self,
        target_id: u32,
        proposed: Position,
        grid: GridSize,
    ) -> MoveOutcome {
        let Some(session) = self.sessions.get(&target_id) else {
            return MoveOutcome::UnknownParticipant;
        };

        if session.participant.appearance.is_guest() {
            return MoveOutcome::NoBoardPresence;
        }

        self.apply_validated_move(target_id, proposed, grid)
    }

    fn apply_validated_move(
        &mut self,
        target_id: u32,
        proposed: Position,
        grid: GridSize,
    ) -> MoveOutcome {
        let current = match self.sessions.get(&target_id) {
            Some(session) => session.participant.position,
            None => return MoveOutcome::UnknownParticipant,
        };

        let occupants: Vec<Position> = self
            .sessions
            .iter()
            .filter(|(id, _)| **id != target_id)
            .map(|(_, session)| session.participant.position)
            .collect();

        match movement::validate(current, proposed, &occupants, grid) {
            MoveDecision::Accept => {
                if let Some(session) = self.sessions.get_mut(&target_id) {
                    session.participant.position = proposed;
                }
                MoveOutcome::Applied
            }
            MoveDecision::Reject(reason) => MoveOutcome::Rejected(reason),
        }
    }

    fn emoji_available(&self, token: &str) -> bool {
        self.catalog.iter().any(|allowed| allowed.as_str() == token)
            && !self
                .sessions
                .values()
                .any(|session| session.participant.appearance.emoji_token() == Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::with_default_catalog()
    }

    fn emoji_request(token: &str) -> AppearanceRequest {
        AppearanceRequest {
            emoji: Some(token.to_string()),
            image: None,
        }
    }

    fn grid() -> GridSize {
        GridSize::default()
    }

    #[test]
    fn test_join_with_emoji() {
        let mut registry = registry();

        let participant = registry.join(1, "Ada", emoji_request("🤖")).unwrap();
        assert_eq!(participant.name, "Ada");
        assert_eq!(participant.appearance, Appearance::Emoji("🤖".to_string()));
        assert_eq!(participant.position, SPAWN_POSITION);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_join_rejects_claimed_emoji() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();

        let error = registry.join(2, "Brin", emoji_request("🤖")).unwrap_err();
        assert_eq!(error, JoinError::AppearanceConflict);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn test_join_rejects_unknown_emoji() {
        let mut registry = registry();

        let error = registry.join(1, "Ada", emoji_request("🦀")).unwrap_err();
        assert_eq!(error, JoinError::AppearanceInvalid);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_join_falls_back_to_image_when_emoji_taken() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();

        let request = AppearanceRequest {
            emoji: Some("🤖".to_string()),
            image: Some("data:image/png;base64,abc".to_string()),
        };
        let participant = registry.join(2, "Brin", request).unwrap();
        assert_eq!(
            participant.appearance,
            Appearance::Image("data:image/png;base64,abc".to_string())
        );
    }

    #[test]
    fn test_join_with_image_only() {
        let mut registry = registry();

        let request = AppearanceRequest {
            emoji: None,
            image: Some("data:image/png;base64,abc".to_string()),
        };
        assert!(registry.join(1, "Ada", request).is_ok());
    }

    #[test]
    fn test_join_rejects_empty_appearance() {
        let mut registry = registry();

        let error = registry.join(1, "Ada", AppearanceRequest::default()).unwrap_err();
        assert_eq!(error, JoinError::AppearanceInvalid);
    }

    #[test]
    fn test_join_rejects_blank_name() {
        let mut registry = registry();

        let error = registry.join(1, "   ", emoji_request("🤖")).unwrap_err();
        assert_eq!(error, JoinError::EmptyName);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rejoin_replaces_record_and_keeps_own_emoji_claimed() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();
        registry.move_self(1, Position::new(2, 2), grid(), Instant::now());

        // The requester's own claim counts against a re-pick of the same token
        let error = registry.join(1, "Ada", emoji_request("🤖")).unwrap_err();
        assert_eq!(error, JoinError::AppearanceConflict);

        // Picking a different token replaces the record and resets position
        let participant = registry.join(1, "Ada", emoji_request("🐺")).unwrap();
        assert_eq!(participant.position, SPAWN_POSITION);
        assert_eq!(registry.len(), 1);

        // The old token is free again
        assert!(registry.join(2, "Brin", emoji_request("🤖")).is_ok());
    }

    #[test]
    fn test_emoji_never_shared_between_live_participants() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();
        registry.join(2, "Brin", emoji_request("🤖")).unwrap_err();
        registry.leave(1);

        // Token is reclaimable once the holder is gone
        assert!(registry.join(2, "Brin", emoji_request("🤖")).is_ok());
    }

    #[test]
    fn test_join_as_guest() {
        let mut registry = registry();

        let guest = registry.join_as_guest(9);
        assert_eq!(guest.name, "Guest_9");
        assert_eq!(guest.appearance, Appearance::Guest);
        assert_eq!(guest.position, GUEST_POSITION);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();

        assert!(registry.leave(1));
        assert!(!registry.leave(1));
        assert!(!registry.leave(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_matches_membership() {
        let mut registry = registry();
        registry.join(2, "Brin", emoji_request("🐺")).unwrap();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();
        registry.join_as_guest(3);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[&1].name, "Ada");
        assert_eq!(snapshot[&2].name, "Brin");
        assert_eq!(snapshot[&3].name, "Guest_3");

        registry.leave(2);
        assert!(!registry.snapshot().contains_key(&2));
    }

    #[test]
    fn test_move_self_applies() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();

        let outcome = registry.move_self(1, Position::new(3, 3), grid(), Instant::now());
        assert_eq!(outcome, MoveOutcome::Applied);
        assert_eq!(registry.get(1).unwrap().position, Position::new(3, 3));
    }

    #[test]
    fn test_move_self_throttled_within_cooldown() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();

        let first = Instant::now();
        assert_eq!(
            registry.move_self(1, Position::new(3, 3), grid(), first),
            MoveOutcome::Applied
        );

        let outcome = registry.move_self(
            1,
            Position::new(3, 4),
            grid(),
            first + Duration::from_millis(MOVE_COOLDOWN_MS - 1),
        );
        assert_eq!(outcome, MoveOutcome::Throttled);
        assert_eq!(registry.get(1).unwrap().position, Position::new(3, 3));

        let outcome = registry.move_self(
            1,
            Position::new(3, 4),
            grid(),
            first + Duration::from_millis(MOVE_COOLDOWN_MS),
        );
        assert_eq!(outcome, MoveOutcome::Applied);
    }

    #[test]
    fn test_rejected_attempt_still_advances_debounce() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();

        let first = Instant::now();
        // Out of range, but the attempt counts against the cooldown
        assert_eq!(
            registry.move_self(1, Position::new(10, 10), grid(), first),
            MoveOutcome::Rejected(RejectReason::OutOfRange)
        );
        assert_eq!(
            registry.move_self(
                1,
                Position::new(1, 1),
                grid(),
                first + Duration::from_millis(10)
            ),
            MoveOutcome::Throttled
        );
    }

    #[test]
    fn test_move_self_rejects_occupied_square() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();
        registry.join(2, "Brin", emoji_request("🐺")).unwrap();
        registry
            .move_by_operator(2, Position::new(2, 2), grid());

        let outcome = registry.move_self(1, Position::new(2, 2), grid(), Instant::now());
        assert_eq!(outcome, MoveOutcome::Rejected(RejectReason::Occupied));
    }

    #[test]
    fn test_guests_cannot_move() {
        let mut registry = registry();
        registry.join_as_guest(1);

        let self_move = registry.move_self(1, Position::new(0, 0), grid(), Instant::now());
        assert_eq!(self_move, MoveOutcome::NoBoardPresence);

        let operator_move = registry.move_by_operator(1, Position::new(0, 0), grid());
        assert_eq!(operator_move, MoveOutcome::NoBoardPresence);
        assert_eq!(registry.get(1).unwrap().position, GUEST_POSITION);
    }

    #[test]
    fn test_operator_move_skips_cooldown() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();

        assert_eq!(
            registry.move_by_operator(1, Position::new(3, 3), grid()),
            MoveOutcome::Applied
        );
        assert_eq!(
            registry.move_by_operator(1, Position::new(6, 6), grid()),
            MoveOutcome::Applied
        );
        assert_eq!(registry.get(1).unwrap().position, Position::new(6, 6));
    }

    #[test]
    fn test_move_unknown_participant() {
        let mut registry = registry();

        let outcome = registry.move_self(7, Position::new(1, 1), grid(), Instant::now());
        assert_eq!(outcome, MoveOutcome::UnknownParticipant);
    }

    #[test]
    fn test_shrinking_grid_does_not_clamp_positions() {
        let mut registry = registry();
        registry.join(1, "Ada", emoji_request("🤖")).unwrap();
        for step in 1..=5 {
            let target = Position::new(step * 3, step * 3);
            assert_eq!(
                registry.move_by_operator(1, target, grid()),
                MoveOutcome::Applied
            );
        }
        assert_eq!(registry.get(1).unwrap().position, Position::new(15, 15));

        // The registry holds no grid state; a later, smaller grid only
        // affects new validations, never stored positions
        let small = GridSize::new(5, 5);
        assert_eq!(
            registry.move_by_operator(1, Position::new(16, 15), small),
            MoveOutcome::Rejected(RejectReason::OutOfBounds)
        );
        assert_eq!(registry.get(1).unwrap().position, Position::new(15, 15));
    }
}
