use std::fmt;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::board::Board;
use crate::game_state::MatchStatus;
use crate::record::PlayerId;
use crate::store::StoreError;

/// Returned by a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedMatch {
    pub match_id: Uuid,
    pub room_code: String,
    pub status: MatchStatus,
}

/// Returned by an accepted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub room_code: String,
    pub board: Board,
    pub status: MatchStatus,
    pub winner: Option<PlayerId>,
    pub current_turn: PlayerId,
    pub sequence: u32,
}

/// Result of a rematch confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rematch", rename_all = "snake_case")]
pub enum RematchOutcome {
    WaitingForOpponent,
    Started { room_code: String },
}

/// Why a requested transition disagrees with the room's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    AlreadyHost,
    RoomFull,
    NotWaiting,
    NotHost,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConflictReason::AlreadyHost => write!(f, "you are already the host of this room"),
            ConflictReason::RoomFull => write!(f, "room is full"),
            ConflictReason::NotWaiting => write!(f, "room is no longer waiting for players"),
            ConflictReason::NotHost => write!(f, "only the host can cancel this room"),
        }
    }
}

/// Every way a coordinator action can be refused. Validation errors are
/// raised while the room lock is held and abort the whole transaction.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Error: Room {0} not found.")]
    NotFound(String),
    #[error("Error: Conflict, {0}.")]
    Conflict(ConflictReason),
    #[error("Error: Not your turn.")]
    TurnViolation,
    #[error("Error: Cell at row {row}, col {col} is already occupied.")]
    CellOccupied { row: u8, col: u8 },
    #[error("Error: Action not allowed while the match is {0}.")]
    InvalidState(MatchStatus),
    #[error("Error: You are not a player in this room.")]
    Forbidden,
    #[error("Error: Player {0} already has an active match.")]
    ActiveSessionConflict(PlayerId),
    #[error("Error: Cell at row {row}, col {col} is outside the board.")]
    OutOfBounds { row: u8, col: u8 },
    #[error("Error: Could not allocate a free room code.")]
    RoomCodesExhausted,
    #[error("Error: Storage failure: {0}")]
    Storage(StoreError),
}

impl MatchError {
    /// Stable machine-readable name, used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::NotFound(_) => "not_found",
            MatchError::Conflict(_) => "conflict",
            MatchError::TurnViolation => "turn_violation",
            MatchError::CellOccupied { .. } => "cell_occupied",
            MatchError::InvalidState(_) => "invalid_state",
            MatchError::Forbidden => "forbidden",
            MatchError::ActiveSessionConflict(_) => "active_session_conflict",
            MatchError::OutOfBounds { .. } => "out_of_bounds",
            MatchError::RoomCodesExhausted => "room_codes_exhausted",
            MatchError::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for MatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ActiveSession(player) => MatchError::ActiveSessionConflict(player),
            other => MatchError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::test_case;

    fn sample(variant_name: &str) -> MatchError {
        match variant_name {
            "NotFound" => MatchError::NotFound("000000".to_string()),
            "Conflict" => MatchError::Conflict(ConflictReason::RoomFull),
            "TurnViolation" => MatchError::TurnViolation,
            "CellOccupied" => MatchError::CellOccupied { row: 1, col: 2 },
            "InvalidState" => MatchError::InvalidState(MatchStatus::Waiting),
            "Forbidden" => MatchError::Forbidden,
            "ActiveSessionConflict" => MatchError::ActiveSessionConflict(Uuid::nil()),
            "OutOfBounds" => MatchError::OutOfBounds { row: 3, col: 0 },
            "RoomCodesExhausted" => MatchError::RoomCodesExhausted,
            "Storage" => MatchError::Storage(StoreError::LockPoisoned),
            _ => unreachable!(),
        }
    }

    #[test_case("NotFound")]
    #[test_case("Conflict")]
    #[test_case("TurnViolation")]
    #[test_case("CellOccupied")]
    #[test_case("InvalidState")]
    #[test_case("Forbidden")]
    #[test_case("ActiveSessionConflict")]
    #[test_case("OutOfBounds")]
    #[test_case("RoomCodesExhausted")]
    #[test_case("Storage")]
    fn match_error_display_contains_error(variant_name: &str) {
        let msg = format!("{}", sample(variant_name));
        assert!(msg.starts_with("Error:"), "MatchError::{} display should start with 'Error:', got: {}", variant_name, msg);
    }

    #[test]
    fn conflict_message_names_reason() {
        let err = MatchError::Conflict(ConflictReason::AlreadyHost);
        assert_eq!(err.to_string(), "Error: Conflict, you are already the host of this room.");
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn active_session_store_error_maps_to_session_conflict() {
        let player = Uuid::new_v4();
        let err: MatchError = StoreError::ActiveSession(player).into();
        assert_eq!(err, MatchError::ActiveSessionConflict(player));

        let err: MatchError = StoreError::LockPoisoned.into();
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn rematch_outcome_serde() {
        let started = RematchOutcome::Started { room_code: "123456".to_string() };
        let json = serde_json::to_string(&started).unwrap();
        assert_eq!(json, r#"{"rematch":"started","room_code":"123456"}"#);
        let waiting = serde_json::to_string(&RematchOutcome::WaitingForOpponent).unwrap();
        assert_eq!(waiting, r#"{"rematch":"waiting_for_opponent"}"#);
    }
}
