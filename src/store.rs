//! Storage seam between the coordinator and durable state.
//!
//! A [`MatchStore`] hands out [`MatchTx`] transactions. Everything a
//! coordinator action writes goes through one transaction and becomes visible
//! only on [`MatchTx::commit`]; dropping the transaction rolls back and
//! releases any room lock it holds.

use crate::record::{Match, Move, NewMove, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Another retained match already uses this room code.
    #[error("Error: Room code {0} is already taken.")]
    RoomCodeTaken(String),
    /// The write would give this player a second active match.
    #[error("Error: Player {0} already has an active match.")]
    ActiveSession(PlayerId),
    #[error("Error: Store lock poisoned.")]
    LockPoisoned,
    #[error("Error: Stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("Error: Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// A match read under its room lock, with the length of its move log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedMatch {
    pub record: Match,
    pub move_count: usize,
}

/// Durable, lockable record store for matches and their move logs.
pub trait MatchStore: Send + Sync {
    /// Start a transaction. Room locks are taken lazily by
    /// [`MatchTx::lock_and_read`].
    fn begin(&self) -> Result<Box<dyn MatchTx + '_>, StoreError>;

    /// Unlocked read of the current committed state, for polling.
    fn find(&self, room_code: &str) -> Result<Option<Match>, StoreError>;

    /// Move log of a room in sequence order, `None` if the room is unknown.
    fn moves(&self, room_code: &str) -> Result<Option<Vec<Move>>, StoreError>;

    /// Delete terminal matches created before `cutoff_epoch_ms` along with
    /// their moves, freeing their room codes. Rooms currently locked are kept.
    fn purge_terminal_before(&self, cutoff_epoch_ms: u64) -> Result<usize, StoreError>;
}

/// One coordinator action's worth of reads and writes.
pub trait MatchTx {
    /// Lock the room and read it. Blocks while another transaction holds the
    /// same room; the lock lasts until commit or drop.
    fn lock_and_read(&mut self, room_code: &str) -> Result<Option<LockedMatch>, StoreError>;

    /// Number of `WAITING`/`IN_PROGRESS` matches involving `player`.
    fn count_active(&mut self, player: PlayerId) -> Result<usize, StoreError>;

    /// Insert a new match. Fails with [`StoreError::RoomCodeTaken`] on a code
    /// collision, either here or at commit.
    fn insert(&mut self, record: &Match) -> Result<(), StoreError>;

    /// Replace a match previously read through `lock_and_read`.
    fn update(&mut self, record: &Match) -> Result<(), StoreError>;

    /// Append to the move log, assigning `1 + existing moves` as the sequence.
    fn append_move(&mut self, entry: NewMove) -> Result<Move, StoreError>;

    /// Delete the room if it is still `WAITING` and `requester` hosts it.
    /// Returns whether a row was deleted.
    fn delete_waiting(&mut self, room_code: &str, requester: PlayerId) -> Result<bool, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
