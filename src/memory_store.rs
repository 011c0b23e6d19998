use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard};
use uuid::Uuid;
use crate::record::{Match, Move, NewMove, PlayerId};
use crate::store::{LockedMatch, MatchStore, MatchTx, StoreError};

#[derive(Default)]
struct Tables {
    matches: HashMap<Uuid, Match>,
    by_code: HashMap<String, Uuid>,
    moves: HashMap<Uuid, Vec<Move>>,
}

impl Tables {
    fn by_room(&self, room_code: &str) -> Option<&Match> {
        self.by_code.get(room_code).and_then(|id| self.matches.get(id))
    }

    /// Enforces the single-active-session rule at commit time, so two
    /// transactions that each passed the session gate cannot both land.
    fn check_single_session(&self, record: &Match, staged: &[Write]) -> Result<(), StoreError> {
        if !record.status.is_active() {
            return Ok(());
        }
        for player in record.players() {
            let clash = self.matches.values().any(|other| {
                other.id != record.id
                    && other.status.is_active()
                    && other.involves(player)
                    && !staged.iter().any(|w| w.retires(other.id))
            });
            if clash {
                return Err(StoreError::ActiveSession(player));
            }
        }
        Ok(())
    }

    fn apply(&mut self, write: Write) {
        match write {
            Write::Insert(record) => {
                self.by_code.insert(record.room_code.clone(), record.id);
                self.moves.entry(record.id).or_default();
                self.matches.insert(record.id, record);
            }
            Write::Update(record) => {
                if let Some(slot) = self.matches.get_mut(&record.id) {
                    *slot = record;
                }
            }
            Write::Append(entry) => {
                self.moves.entry(entry.match_id).or_default().push(entry);
            }
            Write::Delete(id) => {
                if let Some(record) = self.matches.remove(&id) {
                    self.by_code.remove(&record.room_code);
                }
                self.moves.remove(&id);
            }
        }
    }
}

enum Write {
    Insert(Match),
    Update(Match),
    Append(Move),
    Delete(Uuid),
}

impl Write {
    /// Whether this write takes match `id` out of the active set.
    fn retires(&self, id: Uuid) -> bool {
        match self {
            Write::Update(record) => record.id == id && record.status.is_terminal(),
            Write::Delete(deleted) => *deleted == id,
            _ => false,
        }
    }
}

/// In-process store. Room locks are a set of locked room codes guarded by a
/// mutex and condition variable; writes are staged per transaction and applied
/// in one step on commit. Distinct rooms never wait on each other.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    locked_rooms: Mutex<HashSet<String>>,
    released: Condvar,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl MatchStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn MatchTx + '_>, StoreError> {
        Ok(Box::new(MemoryTx {
            store: self,
            held: Vec::new(),
            writes: Vec::new(),
        }))
    }

    fn find(&self, room_code: &str) -> Result<Option<Match>, StoreError> {
        Ok(self.tables()?.by_room(room_code).cloned())
    }

    fn moves(&self, room_code: &str) -> Result<Option<Vec<Move>>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .by_room(room_code)
            .map(|record| tables.moves.get(&record.id).cloned().unwrap_or_default()))
    }

    fn purge_terminal_before(&self, cutoff_epoch_ms: u64) -> Result<usize, StoreError> {
        // Holding the lock set keeps new transactions from locking a room we
        // are about to delete.
        let locked = self.locked_rooms.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut tables = self.tables()?;
        let expired: Vec<Uuid> = tables
            .matches
            .values()
            .filter(|m| m.status.is_terminal()
                && m.retained_since_epoch_ms() < cutoff_epoch_ms
                && !locked.contains(&m.room_code))
            .map(|m| m.id)
            .collect();
        for id in &expired {
            tables.apply(Write::Delete(*id));
        }
        Ok(expired.len())
    }
}

struct MemoryTx<'a> {
    store: &'a MemoryStore,
    held: Vec<String>,
    writes: Vec<Write>,
}

impl MemoryTx<'_> {
    fn acquire(&mut self, room_code: &str) -> Result<(), StoreError> {
        if self.held.iter().any(|c| c == room_code) {
            return Ok(());
        }
        let mut locked = self.store.locked_rooms.lock().map_err(|_| StoreError::LockPoisoned)?;
        while locked.contains(room_code) {
            tracing::debug!(room_code, "waiting for room lock");
            locked = self.store.released.wait(locked).map_err(|_| StoreError::LockPoisoned)?;
        }
        locked.insert(room_code.to_string());
        self.held.push(room_code.to_string());
        Ok(())
    }

    fn staged_moves(&self, match_id: Uuid) -> usize {
        self.writes
            .iter()
            .filter(|w| matches!(w, Write::Append(m) if m.match_id == match_id))
            .count()
    }
}

impl MatchTx for MemoryTx<'_> {
    fn lock_and_read(&mut self, room_code: &str) -> Result<Option<LockedMatch>, StoreError> {
        self.acquire(room_code)?;
        let tables = self.store.tables()?;
        Ok(tables.by_room(room_code).map(|record| LockedMatch {
            record: record.clone(),
            move_count: tables.moves.get(&record.id).map_or(0, Vec::len),
        }))
    }

    fn count_active(&mut self, player: PlayerId) -> Result<usize, StoreError> {
        let tables = self.store.tables()?;
        Ok(tables
            .matches
            .values()
            .filter(|m| m.status.is_active() && m.involves(player))
            .count())
    }

    fn insert(&mut self, record: &Match) -> Result<(), StoreError> {
        let staged_clash = self
            .writes
            .iter()
            .any(|w| matches!(w, Write::Insert(m) if m.room_code == record.room_code));
        if staged_clash || self.store.tables()?.by_code.contains_key(&record.room_code) {
            return Err(StoreError::RoomCodeTaken(record.room_code.clone()));
        }
        self.writes.push(Write::Insert(record.clone()));
        Ok(())
    }

    fn update(&mut self, record: &Match) -> Result<(), StoreError> {
        debug_assert!(self.held.contains(&record.room_code), "update outside room lock");
        self.writes.push(Write::Update(record.clone()));
        Ok(())
    }

    fn append_move(&mut self, entry: NewMove) -> Result<Move, StoreError> {
        let committed = self
            .store
            .tables()?
            .moves
            .get(&entry.match_id)
            .map_or(0, Vec::len);
        let sequence = (committed + self.staged_moves(entry.match_id) + 1) as u32;
        let recorded = entry.into_move(sequence);
        self.writes.push(Write::Append(recorded.clone()));
        Ok(recorded)
    }

    fn delete_waiting(&mut self, room_code: &str, requester: PlayerId) -> Result<bool, StoreError> {
        let target = self
            .store
            .tables()?
            .by_room(room_code)
            .filter(|m| m.status == crate::MatchStatus::Waiting && m.player1 == requester)
            .map(|m| m.id);
        match target {
            Some(id) => {
                self.writes.push(Write::Delete(id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let store = self.store;
        let mut tables = store.tables()?;
        for write in &self.writes {
            match write {
                Write::Insert(record) => {
                    if tables.by_code.contains_key(&record.room_code) {
                        return Err(StoreError::RoomCodeTaken(record.room_code.clone()));
                    }
                    tables.check_single_session(record, &self.writes)?;
                }
                Write::Update(record) => tables.check_single_session(record, &self.writes)?,
                Write::Append(_) | Write::Delete(_) => {}
            }
        }
        for write in self.writes.drain(..) {
            tables.apply(write);
        }
        Ok(())
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let mut locked = match self.store.locked_rooms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for code in self.held.drain(..) {
            locked.remove(&code);
        }
        self.store.released.notify_all();
    }
}
