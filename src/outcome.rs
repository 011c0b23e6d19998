use serde::{Serialize, Deserialize};
use crate::board::{Board, Mark};

/// The eight winning triples: rows, then columns, then diagonals.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2], [3, 4, 5], [6, 7, 8],
    [0, 3, 6], [1, 4, 7], [2, 5, 8],
    [0, 4, 8], [2, 4, 6],
];

/// Result of inspecting a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Ongoing,
    Draw,
    Winner(Mark),
}

/// Evaluates the board. The first uniformly marked line in [`LINES`] order
/// decides the winner; legality of the position is not checked.
pub fn detect(board: &Board) -> Outcome {
    let cells = board.cells();
    for [a, b, c] in LINES {
        if let Some(mark) = cells[a] {
            if cells[b] == Some(mark) && cells[c] == Some(mark) {
                return Outcome::Winner(mark);
            }
        }
    }
    if board.is_full() {
        Outcome::Draw
    } else {
        Outcome::Ongoing
    }
}
