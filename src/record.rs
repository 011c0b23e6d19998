use std::time::{SystemTime, UNIX_EPOCH};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::board::{Board, CellIndex, Mark};
use crate::game_state::MatchStatus;

/// Identity of an authenticated player, as handed to the coordinator by the
/// transport layer.
pub type PlayerId = Uuid;

pub(crate) fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One of the two slots in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    pub fn mark(self) -> Mark {
        match self {
            Seat::First => Mark::X,
            Seat::Second => Mark::O,
        }
    }
}

/// A match as stored and as returned to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub room_code: String,
    pub player1: PlayerId,
    pub player2: Option<PlayerId>,
    pub current_turn: PlayerId,
    pub board: Board,
    pub status: MatchStatus,
    pub winner: Option<PlayerId>,
    pub rematch_confirmed1: bool,
    pub rematch_confirmed2: bool,
    pub next_room_code: Option<String>,
    pub created_at_epoch_ms: u64,
    /// When the match first became terminal; retention counts from here.
    pub ended_at_epoch_ms: Option<u64>,
}

impl Match {
    /// A fresh room with only the creator seated.
    pub fn waiting(room_code: String, creator: PlayerId) -> Match {
        Match {
            id: Uuid::new_v4(),
            room_code,
            player1: creator,
            player2: None,
            current_turn: creator,
            board: Board::empty(),
            status: MatchStatus::Waiting,
            winner: None,
            rematch_confirmed1: false,
            rematch_confirmed2: false,
            next_room_code: None,
            created_at_epoch_ms: epoch_ms_now(),
            ended_at_epoch_ms: None,
        }
    }

    /// A match that starts immediately with both seats filled.
    pub fn started(room_code: String, player1: PlayerId, player2: PlayerId) -> Match {
        Match {
            player2: Some(player2),
            status: MatchStatus::InProgress,
            ..Match::waiting(room_code, player1)
        }
    }

    pub fn seat_of(&self, player: PlayerId) -> Option<Seat> {
        if player == self.player1 {
            Some(Seat::First)
        } else if self.player2 == Some(player) {
            Some(Seat::Second)
        } else {
            None
        }
    }

    pub fn involves(&self, player: PlayerId) -> bool {
        self.seat_of(player).is_some()
    }

    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        std::iter::once(self.player1).chain(self.player2)
    }

    /// The other participant, if `player` is seated and the other seat is filled.
    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        match self.seat_of(player)? {
            Seat::First => self.player2,
            Seat::Second => Some(self.player1),
        }
    }

    pub fn rematch_confirmed(&self, seat: Seat) -> bool {
        match seat {
            Seat::First => self.rematch_confirmed1,
            Seat::Second => self.rematch_confirmed2,
        }
    }

    pub fn confirm_rematch(&mut self, seat: Seat) {
        match seat {
            Seat::First => self.rematch_confirmed1 = true,
            Seat::Second => self.rematch_confirmed2 = true,
        }
    }

    /// Move to `status`, stamping the end time the first time the match
    /// leaves the active set.
    pub fn conclude(&mut self, status: MatchStatus) {
        self.status = status;
        if status.is_terminal() && self.ended_at_epoch_ms.is_none() {
            self.ended_at_epoch_ms = Some(epoch_ms_now());
        }
    }

    /// Instant the retention window is measured from.
    pub fn retained_since_epoch_ms(&self) -> u64 {
        self.ended_at_epoch_ms.unwrap_or(self.created_at_epoch_ms)
    }
}

/// An accepted move, as recorded in the append-only move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub match_id: Uuid,
    pub player: PlayerId,
    pub row: u8,
    pub col: u8,
    /// 1-based position in the match's move log.
    pub sequence: u32,
    pub created_at_epoch_ms: u64,
}

/// A move about to be appended; the store assigns its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewMove {
    pub match_id: Uuid,
    pub player: PlayerId,
    pub cell: CellIndex,
    pub created_at_epoch_ms: u64,
}

impl NewMove {
    pub fn into_move(self, sequence: u32) -> Move {
        Move {
            match_id: self.match_id,
            player: self.player,
            row: self.cell.row(),
            col: self.cell.col(),
            sequence,
            created_at_epoch_ms: self.created_at_epoch_ms,
        }
    }
}
