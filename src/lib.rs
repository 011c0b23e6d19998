//! Room-based, two player tic-tac-toe. A host opens a room and shares its
//! six digit code, a guest joins with the code, and the two alternate moves
//! until someone completes a line or the board fills up. Finished games can be
//! replayed through a rematch that swaps who moves first.
//!
//! Every action runs as a single transaction that locks its room first, so a
//! burst of simultaneous requests against one room behaves as if the requests
//! had arrived one at a time.
//!
//! ## Example usage
//! ```
//! use tictactoe_rooms::{MatchCoordinator, MatchStatus, RematchOutcome};
//! use uuid::Uuid;
//!
//! let coordinator = MatchCoordinator::in_memory();
//! let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
//!
//! let room = coordinator.create_match(alice).unwrap().room_code;
//! coordinator.join_match(&room, bob).unwrap();
//!
//! for (player, row, col) in [(alice, 0, 0), (bob, 1, 0), (alice, 0, 1), (bob, 1, 1), (alice, 0, 2)] {
//!     coordinator.apply_move(&room, player, row, col).unwrap();
//! }
//! let state = coordinator.get_state(&room).unwrap();
//! assert_eq!(state.status, MatchStatus::Finished);
//! assert_eq!(state.winner, Some(alice));
//!
//! assert_eq!(coordinator.rematch(&room, alice).unwrap(), RematchOutcome::WaitingForOpponent);
//! let RematchOutcome::Started { room_code } = coordinator.rematch(&room, bob).unwrap() else {
//!     panic!("both players confirmed");
//! };
//! assert_eq!(coordinator.get_state(&room_code).unwrap().current_turn, bob);
//! ```

mod board;
mod coordinator;
mod game_state;
mod memory_store;
mod outcome;
mod record;
mod result;
mod room_code;
mod session_gate;
mod sqlite_store;
mod store;

#[cfg(feature = "server")]
pub mod config;
#[cfg(feature = "server")]
pub mod http;

#[cfg(test)]
mod tests;

pub use board::*;
pub use coordinator::MatchCoordinator;
pub use game_state::*;
pub use memory_store::MemoryStore;
pub use outcome::{detect, Outcome};
pub use record::{Match, Move, NewMove, PlayerId, Seat};
pub use result::*;
pub use room_code::{MAX_ROOM_CODE_ATTEMPTS, RandomRoomCodes, RoomCodeAllocator};
pub use session_gate::ensure_no_active_match;
pub use sqlite_store::SqliteStore;
pub use store::*;
