use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use crate::result::MatchError;

/// Number of cells on the 3x3 board.
pub const CELL_COUNT: usize = 9;

const EMPTY_CHAR: char = '-';

/// A player's mark. `X` belongs to the first seat, `O` to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    fn to_char(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

/// Position of a cell, `row * 3 + col`. Only constructible from coordinates
/// inside the board, so indexing a [`Board`] with it never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellIndex(usize);

impl CellIndex {
    pub fn from_coords(row: u8, col: u8) -> Option<CellIndex> {
        if row > 2 || col > 2 {
            return None;
        }
        Some(CellIndex(row as usize * 3 + col as usize))
    }

    pub fn value(self) -> usize {
        self.0
    }

    pub fn row(self) -> u8 {
        (self.0 / 3) as u8
    }

    pub fn col(self) -> u8 {
        (self.0 % 3) as u8
    }
}

/// Error returned when decoding a board from its text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardDecodeError {
    #[error("Error: Board must have exactly 9 cells, got {0}.")]
    WrongLength(usize),
    #[error("Error: Board contains unknown cell {0:?}.")]
    UnknownCell(char),
}

/// Immutable 3x3 board. Serialized as nine characters, `X`, `O` or `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Board {
    cells: [Option<Mark>; CELL_COUNT],
}

impl Board {
    pub fn empty() -> Board {
        Board::default()
    }

    pub fn cell(&self, index: CellIndex) -> Option<Mark> {
        self.cells[index.0]
    }

    pub fn cells(&self) -> &[Option<Mark>; CELL_COUNT] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Number of marked cells; equals the length of the owning match's move log.
    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Returns a new board with `mark` placed at `index`. Fails with
    /// [`MatchError::CellOccupied`] when the cell already holds a mark.
    pub fn apply_move(&self, index: CellIndex, mark: Mark) -> Result<Board, MatchError> {
        if self.cells[index.0].is_some() {
            return Err(MatchError::CellOccupied { row: index.row(), col: index.col() });
        }
        let mut next = *self;
        next.cells[index.0] = Some(mark);
        Ok(next)
    }

    pub fn encode(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.map_or(EMPTY_CHAR, Mark::to_char))
            .collect()
    }

    pub fn decode(text: &str) -> Result<Board, BoardDecodeError> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() != CELL_COUNT {
            return Err(BoardDecodeError::WrongLength(chars.len()));
        }
        let mut board = Board::empty();
        for (slot, ch) in board.cells.iter_mut().zip(chars) {
            *slot = match ch {
                'X' => Some(Mark::X),
                'O' => Some(Mark::O),
                EMPTY_CHAR => None,
                other => return Err(BoardDecodeError::UnknownCell(other)),
            };
        }
        Ok(board)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Board {
    type Err = BoardDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Board::decode(s)
    }
}

impl From<Board> for String {
    fn from(board: Board) -> String {
        board.encode()
    }
}

impl TryFrom<String> for Board {
    type Error = BoardDecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Board::decode(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::test_case;

    #[test_case(0, 0, 0)]
    #[test_case(0, 2, 2)]
    #[test_case(1, 1, 4)]
    #[test_case(2, 0, 6)]
    #[test_case(2, 2, 8)]
    fn coords_map_to_row_major_index(row: u8, col: u8, expected: usize) {
        let index = CellIndex::from_coords(row, col).unwrap();
        assert_eq!(index.value(), expected);
        assert_eq!((index.row(), index.col()), (row, col));
    }

    #[test_case(3, 0)]
    #[test_case(0, 3)]
    #[test_case(255, 255)]
    fn coords_outside_board_are_rejected(row: u8, col: u8) {
        assert!(CellIndex::from_coords(row, col).is_none());
    }

    #[test]
    fn apply_move_changes_only_target_cell() {
        let board = Board::decode("X-O------").unwrap();
        let index = CellIndex::from_coords(1, 1).unwrap();
        let next = board.apply_move(index, Mark::X).unwrap();
        assert_eq!(next.encode(), "X-O-X----");
        // source board untouched
        assert_eq!(board.encode(), "X-O------");
    }

    #[test]
    fn apply_move_on_occupied_cell_fails() {
        let board = Board::decode("X--------").unwrap();
        let index = CellIndex::from_coords(0, 0).unwrap();
        assert_eq!(
            board.apply_move(index, Mark::O),
            Err(MatchError::CellOccupied { row: 0, col: 0 })
        );
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert_eq!(Board::decode("XO"), Err(BoardDecodeError::WrongLength(2)));
        assert_eq!(Board::decode("XO-----Z-"), Err(BoardDecodeError::UnknownCell('Z')));
    }

    #[test]
    fn serde_uses_text_form() {
        let board = Board::decode("XO-X-O---").unwrap();
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, "\"XO-X-O---\"");
        let back: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(back, board);
        assert!(serde_json::from_str::<Board>("\"XX\"").is_err());
    }

    #[test]
    fn filled_count_tracks_marks() {
        assert_eq!(Board::empty().filled_count(), 0);
        assert!(Board::empty().is_empty());
        let full = Board::decode("XOXXOOOXX").unwrap();
        assert!(full.is_full());
        assert_eq!(full.filled_count(), 9);
    }
}
