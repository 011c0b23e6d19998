use std::sync::Arc;
use std::time::Duration;
use crate::board::CellIndex;
use crate::game_state::MatchStatus;
use crate::memory_store::MemoryStore;
use crate::outcome::{self, Outcome};
use crate::record::{epoch_ms_now, Match, Move, NewMove, PlayerId};
use crate::result::{ConflictReason, CreatedMatch, MatchError, MoveOutcome, RematchOutcome};
use crate::room_code::{MAX_ROOM_CODE_ATTEMPTS, RandomRoomCodes, RoomCodeAllocator};
use crate::session_gate;
use crate::sqlite_store::SqliteStore;
use crate::store::{MatchStore, MatchTx, StoreError};

/// Drives every room through its lifecycle. Each action runs as one
/// transaction that locks the addressed room before reading it, so actions on
/// the same room are linearizable while distinct rooms proceed in parallel.
#[derive(Clone)]
pub struct MatchCoordinator {
    store: Arc<dyn MatchStore>,
    codes: Arc<dyn RoomCodeAllocator>,
}

/// Lock the room and read it, checking the board against the move log.
fn lock_room(tx: &mut dyn MatchTx, room_code: &str) -> Result<Match, MatchError> {
    let locked = tx
        .lock_and_read(room_code)?
        .ok_or_else(|| MatchError::NotFound(room_code.to_string()))?;
    let marked = locked.record.board.filled_count();
    if marked != locked.move_count {
        tracing::warn!(room_code, marked, moves = locked.move_count, "board disagrees with move log");
        return Err(StoreError::Corrupt(format!(
            "room {} has {} marks but {} moves",
            room_code, marked, locked.move_count
        ))
        .into());
    }
    Ok(locked.record)
}

fn corrupt(record: &Match, what: &str) -> MatchError {
    MatchError::Storage(StoreError::Corrupt(format!("room {}: {}", record.room_code, what)))
}

impl MatchCoordinator {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self::with_room_codes(store, Arc::new(RandomRoomCodes))
    }

    pub fn with_room_codes(store: Arc<dyn MatchStore>, codes: Arc<dyn RoomCodeAllocator>) -> Self {
        MatchCoordinator { store, codes }
    }

    /// Coordinator over a process-local store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Coordinator backed by SQLite at `path`.
    pub fn with_db(path: &str) -> Result<Self, MatchError> {
        let store = SqliteStore::open(path)?;
        Ok(Self::new(Arc::new(store)))
    }

    fn in_transaction<T>(
        &self,
        action: impl FnOnce(&mut dyn MatchTx) -> Result<T, MatchError>,
    ) -> Result<T, MatchError> {
        let mut tx = self.store.begin()?;
        // an early return drops `tx`, which rolls back and releases the room
        let value = action(tx.as_mut())?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs `action` in a transaction with a freshly sampled room code,
    /// starting over whenever the store reports the code as taken.
    fn with_fresh_code<T>(
        &self,
        mut action: impl FnMut(&mut dyn MatchTx, String) -> Result<T, MatchError>,
    ) -> Result<T, MatchError> {
        for attempt in 1..=MAX_ROOM_CODE_ATTEMPTS {
            let code = self.codes.generate();
            match self.in_transaction(|tx| action(tx, code)) {
                Err(MatchError::Storage(StoreError::RoomCodeTaken(taken))) => {
                    tracing::warn!(room_code = %taken, attempt, "room code collision, sampling again");
                }
                other => return other,
            }
        }
        Err(MatchError::RoomCodesExhausted)
    }

    /// Open a new room hosted by `creator`.
    #[tracing::instrument(skip(self))]
    pub fn create_match(&self, creator: PlayerId) -> Result<CreatedMatch, MatchError> {
        let created = self.with_fresh_code(|tx, room_code| {
            session_gate::ensure_no_active_match(tx, creator)?;
            let record = Match::waiting(room_code, creator);
            tx.insert(&record)?;
            Ok(CreatedMatch {
                match_id: record.id,
                room_code: record.room_code,
                status: record.status,
            })
        })?;
        tracing::info!(room_code = %created.room_code, "match created");
        Ok(created)
    }

    /// Take the second seat and start the game.
    #[tracing::instrument(skip(self))]
    pub fn join_match(&self, room_code: &str, joiner: PlayerId) -> Result<Match, MatchError> {
        let joined = self.in_transaction(|tx| {
            session_gate::ensure_no_active_match(tx, joiner)?;
            let mut record = lock_room(tx, room_code)?;
            if record.player1 == joiner {
                return Err(MatchError::Conflict(ConflictReason::AlreadyHost));
            }
            if record.player2.is_some() {
                return Err(MatchError::Conflict(ConflictReason::RoomFull));
            }
            if record.status != MatchStatus::Waiting {
                return Err(MatchError::Conflict(ConflictReason::NotWaiting));
            }
            record.player2 = Some(joiner);
            record.status = MatchStatus::InProgress;
            tx.update(&record)?;
            Ok(record)
        })?;
        tracing::info!("player joined, match in progress");
        Ok(joined)
    }

    /// Place the mover's mark at (`row`, `col`) and advance the game.
    #[tracing::instrument(skip(self))]
    pub fn apply_move(&self, room_code: &str, mover: PlayerId, row: u8, col: u8) -> Result<MoveOutcome, MatchError> {
        let cell = CellIndex::from_coords(row, col).ok_or(MatchError::OutOfBounds { row, col })?;
        let applied = self.in_transaction(|tx| {
            let mut record = lock_room(tx, room_code)?;
            if record.status != MatchStatus::InProgress {
                return Err(MatchError::InvalidState(record.status));
            }
            if mover != record.current_turn {
                return Err(MatchError::TurnViolation);
            }
            let seat = record.seat_of(mover).ok_or_else(|| corrupt(&record, "turn held by a non-player"))?;
            record.board = record.board.apply_move(cell, seat.mark())?;
            record.current_turn = record
                .opponent_of(mover)
                .ok_or_else(|| corrupt(&record, "in progress without a second player"))?;
            match outcome::detect(&record.board) {
                Outcome::Winner(_) => {
                    record.conclude(MatchStatus::Finished);
                    record.winner = Some(mover);
                }
                Outcome::Draw => record.conclude(MatchStatus::Draw),
                Outcome::Ongoing => {}
            }
            tx.update(&record)?;
            let recorded = tx.append_move(NewMove {
                match_id: record.id,
                player: mover,
                cell,
                created_at_epoch_ms: epoch_ms_now(),
            })?;
            Ok(MoveOutcome {
                room_code: record.room_code,
                board: record.board,
                status: record.status,
                winner: record.winner,
                current_turn: record.current_turn,
                sequence: recorded.sequence,
            })
        })?;
        if applied.status != MatchStatus::InProgress {
            tracing::info!(status = %applied.status, moves = applied.sequence, "match decided");
        }
        Ok(applied)
    }

    /// Delete a room nobody has joined yet. Only the host may cancel.
    #[tracing::instrument(skip(self))]
    pub fn cancel_match(&self, room_code: &str, requester: PlayerId) -> Result<(), MatchError> {
        self.in_transaction(|tx| {
            let record = lock_room(tx, room_code)?;
            if record.status != MatchStatus::Waiting {
                return Err(MatchError::Conflict(ConflictReason::NotWaiting));
            }
            if record.player1 != requester {
                return Err(MatchError::Conflict(ConflictReason::NotHost));
            }
            if !tx.delete_waiting(room_code, requester)? {
                return Err(MatchError::Conflict(ConflictReason::NotWaiting));
            }
            Ok(())
        })?;
        tracing::info!("match cancelled");
        Ok(())
    }

    /// Record the requester's wish for a rematch. Once both players have
    /// confirmed, a successor room starts with the seats swapped.
    #[tracing::instrument(skip(self))]
    pub fn rematch(&self, room_code: &str, requester: PlayerId) -> Result<RematchOutcome, MatchError> {
        let outcome = self.with_fresh_code(|tx, successor_code| {
            let mut record = lock_room(tx, room_code)?;
            if !record.status.is_completed() {
                return Err(MatchError::InvalidState(record.status));
            }
            let seat = record.seat_of(requester).ok_or(MatchError::Forbidden)?;
            if let Some(next) = &record.next_room_code {
                return Ok(RematchOutcome::Started { room_code: next.clone() });
            }
            record.confirm_rematch(seat);
            if !(record.rematch_confirmed1 && record.rematch_confirmed2) {
                tx.update(&record)?;
                return Ok(RematchOutcome::WaitingForOpponent);
            }
            let second = record
                .player2
                .ok_or_else(|| corrupt(&record, "completed without a second player"))?;
            let successor = Match::started(successor_code, second, record.player1);
            tx.insert(&successor)?;
            record.next_room_code = Some(successor.room_code.clone());
            tx.update(&record)?;
            Ok(RematchOutcome::Started { room_code: successor.room_code })
        })?;
        if let RematchOutcome::Started { room_code: next } = &outcome {
            tracing::info!(next_room_code = %next, "rematch started");
        }
        Ok(outcome)
    }

    /// Walk away from a room. Leaving a running game forfeits it to the
    /// opponent; leaving a decided game closes it for rematches.
    #[tracing::instrument(skip(self))]
    pub fn leave(&self, room_code: &str, requester: PlayerId) -> Result<Match, MatchError> {
        self.in_transaction(|tx| {
            let mut record = lock_room(tx, room_code)?;
            if !record.involves(requester) {
                return Err(MatchError::Forbidden);
            }
            match record.status {
                MatchStatus::InProgress => {
                    record.conclude(MatchStatus::Abandoned);
                    record.winner = record.opponent_of(requester);
                    tx.update(&record)?;
                    tracing::info!("match forfeited");
                }
                MatchStatus::Finished | MatchStatus::Draw => {
                    record.conclude(MatchStatus::Abandoned);
                    tx.update(&record)?;
                }
                MatchStatus::Waiting | MatchStatus::Abandoned => {}
            }
            Ok(record)
        })
    }

    /// Current state of a room, for polling. Does not take the room lock.
    pub fn get_state(&self, room_code: &str) -> Result<Match, MatchError> {
        self.store
            .find(room_code)?
            .ok_or_else(|| MatchError::NotFound(room_code.to_string()))
    }

    /// Accepted moves of a room, oldest first.
    pub fn move_history(&self, room_code: &str) -> Result<Vec<Move>, MatchError> {
        self.store
            .moves(room_code)?
            .ok_or_else(|| MatchError::NotFound(room_code.to_string()))
    }

    /// Drop rooms that ended more than `retention` ago, releasing their codes.
    pub fn purge_expired(&self, retention: Duration) -> Result<usize, MatchError> {
        let cutoff = epoch_ms_now().saturating_sub(retention.as_millis() as u64);
        let purged = self.store.purge_terminal_before(cutoff)?;
        if purged > 0 {
            tracing::info!(purged, "expired rooms purged");
        }
        Ok(purged)
    }
}

impl Default for MatchCoordinator {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn started(coordinator: &MatchCoordinator) -> (String, PlayerId, PlayerId) {
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let created = coordinator.create_match(host).unwrap();
        coordinator.join_match(&created.room_code, guest).unwrap();
        (created.room_code, host, guest)
    }

    #[test]
    fn test_create_match() {
        let coordinator = MatchCoordinator::in_memory();
        let host = Uuid::new_v4();
        let created = coordinator.create_match(host).unwrap();

        assert_eq!(created.status, MatchStatus::Waiting);
        assert_eq!(created.room_code.len(), 6);
        let state = coordinator.get_state(&created.room_code).unwrap();
        assert_eq!(state.id, created.match_id);
        assert_eq!(state.player1, host);
        assert_eq!(state.current_turn, host);
        assert!(state.player2.is_none());
        assert!(state.board.is_empty());
    }

    #[test]
    fn test_create_with_active_match_fails() {
        let coordinator = MatchCoordinator::in_memory();
        let host = Uuid::new_v4();
        coordinator.create_match(host).unwrap();
        assert_eq!(
            coordinator.create_match(host),
            Err(MatchError::ActiveSessionConflict(host))
        );
    }

    #[test]
    fn test_join_starts_game() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, host, guest) = started(&coordinator);
        let state = coordinator.get_state(&room).unwrap();
        assert_eq!(state.status, MatchStatus::InProgress);
        assert_eq!(state.player2, Some(guest));
        assert_eq!(state.current_turn, host);
    }

    #[test]
    fn test_third_player_join_conflicts() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, _, _) = started(&coordinator);
        assert_eq!(
            coordinator.join_match(&room, Uuid::new_v4()),
            Err(MatchError::Conflict(ConflictReason::RoomFull))
        );
    }

    #[test]
    fn test_join_unknown_room() {
        let coordinator = MatchCoordinator::in_memory();
        assert_eq!(
            coordinator.join_match("999999", Uuid::new_v4()),
            Err(MatchError::NotFound("999999".to_string()))
        );
    }

    #[test]
    fn test_move_out_of_turn() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, _, guest) = started(&coordinator);
        assert_eq!(coordinator.apply_move(&room, guest, 0, 0), Err(MatchError::TurnViolation));
    }

    #[test]
    fn test_move_on_occupied_cell() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, host, guest) = started(&coordinator);
        coordinator.apply_move(&room, host, 1, 1).unwrap();
        assert_eq!(
            coordinator.apply_move(&room, guest, 1, 1),
            Err(MatchError::CellOccupied { row: 1, col: 1 })
        );
        assert_eq!(coordinator.move_history(&room).unwrap().len(), 1);
    }

    #[test]
    fn test_move_out_of_bounds() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, host, _) = started(&coordinator);
        assert_eq!(
            coordinator.apply_move(&room, host, 3, 0),
            Err(MatchError::OutOfBounds { row: 3, col: 0 })
        );
    }

    #[test]
    fn test_move_before_join() {
        let coordinator = MatchCoordinator::in_memory();
        let host = Uuid::new_v4();
        let created = coordinator.create_match(host).unwrap();
        assert_eq!(
            coordinator.apply_move(&created.room_code, host, 0, 0),
            Err(MatchError::InvalidState(MatchStatus::Waiting))
        );
    }

    #[test]
    fn test_move_passes_turn() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, host, guest) = started(&coordinator);
        let outcome = coordinator.apply_move(&room, host, 0, 2).unwrap();
        assert_eq!(outcome.current_turn, guest);
        assert_eq!(outcome.sequence, 1);
        assert_eq!(outcome.board.encode(), "--X------");
        let outcome = coordinator.apply_move(&room, guest, 2, 0).unwrap();
        assert_eq!(outcome.current_turn, host);
        assert_eq!(outcome.board.encode(), "--X---O--");
    }

    #[test]
    fn test_cancel_by_host() {
        let coordinator = MatchCoordinator::in_memory();
        let host = Uuid::new_v4();
        let created = coordinator.create_match(host).unwrap();
        coordinator.cancel_match(&created.room_code, host).unwrap();
        assert!(matches!(
            coordinator.get_state(&created.room_code),
            Err(MatchError::NotFound(_))
        ));
        // host is free to open another room
        coordinator.create_match(host).unwrap();
    }

    #[test]
    fn test_cancel_by_stranger_or_after_join() {
        let coordinator = MatchCoordinator::in_memory();
        let host = Uuid::new_v4();
        let created = coordinator.create_match(host).unwrap();
        assert_eq!(
            coordinator.cancel_match(&created.room_code, Uuid::new_v4()),
            Err(MatchError::Conflict(ConflictReason::NotHost))
        );
        coordinator.join_match(&created.room_code, Uuid::new_v4()).unwrap();
        assert_eq!(
            coordinator.cancel_match(&created.room_code, host),
            Err(MatchError::Conflict(ConflictReason::NotWaiting))
        );
        assert!(coordinator.get_state(&created.room_code).is_ok());
    }

    #[test]
    fn test_leave_in_progress_forfeits() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, host, guest) = started(&coordinator);
        let left = coordinator.leave(&room, host).unwrap();
        assert_eq!(left.status, MatchStatus::Abandoned);
        assert_eq!(left.winner, Some(guest));
        assert_eq!(
            coordinator.apply_move(&room, host, 0, 0),
            Err(MatchError::InvalidState(MatchStatus::Abandoned))
        );
    }

    #[test]
    fn test_leave_waiting_is_noop() {
        let coordinator = MatchCoordinator::in_memory();
        let host = Uuid::new_v4();
        let created = coordinator.create_match(host).unwrap();
        let left = coordinator.leave(&created.room_code, host).unwrap();
        assert_eq!(left.status, MatchStatus::Waiting);
    }

    #[test]
    fn test_leave_by_stranger_forbidden() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, _, _) = started(&coordinator);
        assert_eq!(coordinator.leave(&room, Uuid::new_v4()), Err(MatchError::Forbidden));
    }

    #[test]
    fn test_rematch_requires_completed_game() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, host, _) = started(&coordinator);
        assert_eq!(
            coordinator.rematch(&room, host),
            Err(MatchError::InvalidState(MatchStatus::InProgress))
        );
    }

    #[test]
    fn test_get_state_not_found() {
        let coordinator = MatchCoordinator::default();
        assert!(matches!(coordinator.get_state("000000"), Err(MatchError::NotFound(_))));
        assert!(matches!(coordinator.move_history("000000"), Err(MatchError::NotFound(_))));
    }

    #[test]
    fn test_with_db_in_memory() {
        let coordinator = MatchCoordinator::with_db(":memory:").unwrap();
        let (room, host, _) = started(&coordinator);
        coordinator.apply_move(&room, host, 0, 0).unwrap();
        assert_eq!(coordinator.move_history(&room).unwrap().len(), 1);
    }

    #[test]
    fn test_purge_expired_keeps_recent_rooms() {
        let coordinator = MatchCoordinator::in_memory();
        let (room, host, _) = started(&coordinator);
        coordinator.leave(&room, host).unwrap();
        assert_eq!(coordinator.purge_expired(Duration::from_secs(3600)).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(coordinator.purge_expired(Duration::ZERO).unwrap(), 1);
        assert!(coordinator.get_state(&room).is_err());
    }
}
