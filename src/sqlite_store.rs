use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use crate::board::Board;
use crate::game_state::MatchStatus;
use crate::record::{Match, Move, NewMove, PlayerId};
use crate::store::{LockedMatch, MatchStore, MatchTx, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS matches (
        id TEXT PRIMARY KEY,
        room_code TEXT NOT NULL UNIQUE,
        player1 TEXT NOT NULL,
        player2 TEXT,
        current_turn TEXT NOT NULL,
        board TEXT NOT NULL,
        status TEXT NOT NULL,
        winner TEXT,
        rematch_confirmed1 INTEGER NOT NULL DEFAULT 0,
        rematch_confirmed2 INTEGER NOT NULL DEFAULT 0,
        next_room_code TEXT,
        created_at INTEGER NOT NULL,
        ended_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS matches_player1 ON matches (player1, status);
    CREATE INDEX IF NOT EXISTS matches_player2 ON matches (player2, status);
    CREATE TABLE IF NOT EXISTS moves (
        match_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        player TEXT NOT NULL,
        row_idx INTEGER NOT NULL,
        col_idx INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (match_id, sequence)
    );";

const MATCH_COLUMNS: &str = "id, room_code, player1, player2, current_turn, board, status, winner, \
     rematch_confirmed1, rematch_confirmed2, next_room_code, created_at, ended_at";

const ACTIVE: &str = "status IN ('WAITING', 'IN_PROGRESS')";

/// SQLite-backed persistence. All transactions share one connection and run
/// under `BEGIN IMMEDIATE`, so each holds the database write lock from its
/// first read to commit. That is stronger than a row lock: every room, and
/// the session count read, is serialized.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        add_ended_at_column(&conn)?;
        tracing::info!(path, "match store opened");
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Databases created before end times were tracked lack the column.
fn add_ended_at_column(conn: &Connection) -> Result<(), StoreError> {
    let present: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('matches') WHERE name = 'ended_at'",
        [],
        |row| row.get(0),
    )?;
    if present == 0 {
        conn.execute_batch("ALTER TABLE matches ADD COLUMN ended_at INTEGER")?;
        tracing::info!("added ended_at column to matches");
    }
    Ok(())
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn optional_uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| Uuid::parse_str(&t))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn match_from_row(row: &Row) -> rusqlite::Result<Match> {
    let board_text: String = row.get(5)?;
    let board = Board::decode(&board_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status_text: String = row.get(6)?;
    let status = status_text.parse::<MatchStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
    })?;
    let created_at: i64 = row.get(11)?;
    let ended_at: Option<i64> = row.get(12)?;
    Ok(Match {
        id: uuid_column(row, 0)?,
        room_code: row.get(1)?,
        player1: uuid_column(row, 2)?,
        player2: optional_uuid_column(row, 3)?,
        current_turn: uuid_column(row, 4)?,
        board,
        status,
        winner: optional_uuid_column(row, 7)?,
        rematch_confirmed1: row.get(8)?,
        rematch_confirmed2: row.get(9)?,
        next_room_code: row.get(10)?,
        created_at_epoch_ms: created_at as u64,
        ended_at_epoch_ms: ended_at.map(|t| t as u64),
    })
}

fn move_from_row(row: &Row) -> rusqlite::Result<Move> {
    let created_at: i64 = row.get(5)?;
    Ok(Move {
        match_id: uuid_column(row, 0)?,
        sequence: row.get(1)?,
        player: uuid_column(row, 2)?,
        row: row.get(3)?,
        col: row.get(4)?,
        created_at_epoch_ms: created_at as u64,
    })
}

fn select_match(conn: &Connection, room_code: &str) -> Result<Option<Match>, StoreError> {
    let sql = format!("SELECT {} FROM matches WHERE room_code = ?1", MATCH_COLUMNS);
    Ok(conn.query_row(&sql, params![room_code], match_from_row).optional()?)
}

/// Only a UNIQUE violation means the room code is taken; NOT NULL or primary
/// key failures are real errors.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl MatchStore for SqliteStore {
    fn begin(&self) -> Result<Box<dyn MatchTx + '_>, StoreError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTx { conn, finished: false }))
    }

    fn find(&self, room_code: &str) -> Result<Option<Match>, StoreError> {
        let conn = self.conn()?;
        select_match(&conn, room_code)
    }

    fn moves(&self, room_code: &str) -> Result<Option<Vec<Move>>, StoreError> {
        let conn = self.conn()?;
        let Some(record) = select_match(&conn, room_code)? else {
            return Ok(None);
        };
        let mut stmt = conn.prepare(
            "SELECT match_id, sequence, player, row_idx, col_idx, created_at
             FROM moves WHERE match_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(params![record.id.to_string()], move_from_row)?;
        let mut moves = Vec::new();
        for row in rows {
            moves.push(row?);
        }
        Ok(Some(moves))
    }

    fn purge_terminal_before(&self, cutoff_epoch_ms: u64) -> Result<usize, StoreError> {
        // No transaction can be open while we hold the connection.
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let condition = format!("NOT ({}) AND COALESCE(ended_at, created_at) < ?1", ACTIVE);
        tx.execute(
            &format!("DELETE FROM moves WHERE match_id IN (SELECT id FROM matches WHERE {})", condition),
            params![cutoff_epoch_ms as i64],
        )?;
        let purged = tx.execute(
            &format!("DELETE FROM matches WHERE {}", condition),
            params![cutoff_epoch_ms as i64],
        )?;
        tx.commit()?;
        Ok(purged)
    }
}

struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl SqliteTx<'_> {
    /// Store-side guard for the single-active-session rule.
    fn ensure_no_other_active(&self, record: &Match) -> Result<(), StoreError> {
        if !record.status.is_active() {
            return Ok(());
        }
        let sql = format!(
            "SELECT COUNT(*) FROM matches WHERE {} AND id != ?2 AND (player1 = ?1 OR player2 = ?1)",
            ACTIVE
        );
        for player in record.players() {
            let others: i64 = self.conn.query_row(
                &sql,
                params![player.to_string(), record.id.to_string()],
                |row| row.get(0),
            )?;
            if others > 0 {
                return Err(StoreError::ActiveSession(player));
            }
        }
        Ok(())
    }
}

impl MatchTx for SqliteTx<'_> {
    fn lock_and_read(&mut self, room_code: &str) -> Result<Option<LockedMatch>, StoreError> {
        let Some(record) = select_match(&self.conn, room_code)? else {
            return Ok(None);
        };
        let move_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM moves WHERE match_id = ?1",
            params![record.id.to_string()],
            |row| row.get(0),
        )?;
        Ok(Some(LockedMatch { record, move_count: move_count as usize }))
    }

    fn count_active(&mut self, player: PlayerId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM matches WHERE {} AND (player1 = ?1 OR player2 = ?1)", ACTIVE),
            params![player.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert(&mut self, record: &Match) -> Result<(), StoreError> {
        self.ensure_no_other_active(record)?;
        let sql = format!(
            "INSERT INTO matches ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            MATCH_COLUMNS
        );
        let inserted = self.conn.execute(
            &sql,
            params![
                record.id.to_string(),
                record.room_code,
                record.player1.to_string(),
                record.player2.map(|p| p.to_string()),
                record.current_turn.to_string(),
                record.board.encode(),
                record.status.as_str(),
                record.winner.map(|p| p.to_string()),
                record.rematch_confirmed1,
                record.rematch_confirmed2,
                record.next_room_code,
                record.created_at_epoch_ms as i64,
                record.ended_at_epoch_ms.map(|t| t as i64),
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::RoomCodeTaken(record.room_code.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn update(&mut self, record: &Match) -> Result<(), StoreError> {
        self.ensure_no_other_active(record)?;
        let updated = self.conn.execute(
            "UPDATE matches SET player2 = ?2, current_turn = ?3, board = ?4, status = ?5, winner = ?6,
                rematch_confirmed1 = ?7, rematch_confirmed2 = ?8, next_room_code = ?9, ended_at = ?10
             WHERE id = ?1",
            params![
                record.id.to_string(),
                record.player2.map(|p| p.to_string()),
                record.current_turn.to_string(),
                record.board.encode(),
                record.status.as_str(),
                record.winner.map(|p| p.to_string()),
                record.rematch_confirmed1,
                record.rematch_confirmed2,
                record.next_room_code,
                record.ended_at_epoch_ms.map(|t| t as i64),
            ],
        )?;
        if updated != 1 {
            return Err(StoreError::Corrupt(format!("match {} vanished during update", record.id)));
        }
        Ok(())
    }

    fn append_move(&mut self, entry: NewMove) -> Result<Move, StoreError> {
        let sequence: u32 = self.conn.query_row(
            "INSERT INTO moves (match_id, sequence, player, row_idx, col_idx, created_at)
             VALUES (?1, (SELECT COUNT(*) + 1 FROM moves WHERE match_id = ?1), ?2, ?3, ?4, ?5)
             RETURNING sequence",
            params![
                entry.match_id.to_string(),
                entry.player.to_string(),
                entry.cell.row(),
                entry.cell.col(),
                entry.created_at_epoch_ms as i64,
            ],
            |row| row.get(0),
        )?;
        Ok(entry.into_move(sequence))
    }

    fn delete_waiting(&mut self, room_code: &str, requester: PlayerId) -> Result<bool, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM matches WHERE room_code = ?1 AND status = 'WAITING' AND player1 = ?2",
            params![room_code, requester.to_string()],
        )?;
        Ok(deleted == 1)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "rollback failed");
            }
        }
    }
}
