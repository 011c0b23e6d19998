
use std::sync::Arc;
use uuid::Uuid;
use crate::{MatchCoordinator, MemoryStore, PlayerId, SqliteStore};

/// Coordinator over the named store, `"memory"` or `"sqlite"`.
fn coordinator_for(store: &str) -> MatchCoordinator {
    match store {
        "memory" => MatchCoordinator::new(Arc::new(MemoryStore::new())),
        "sqlite" => MatchCoordinator::new(Arc::new(SqliteStore::open(":memory:").unwrap())),
        other => panic!("unknown store {}", other),
    }
}

/// Helper: a room with both seats taken, host to move.
fn started_room(coordinator: &MatchCoordinator) -> (String, PlayerId, PlayerId) {
    let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
    let room = coordinator.create_match(host).unwrap().room_code;
    coordinator.join_match(&room, guest).unwrap();
    (room, host, guest)
}

/// Helper: play cell indices in order, alternating from the host.
fn play_cells(coordinator: &MatchCoordinator, room: &str, host: PlayerId, guest: PlayerId, cells: &[u8]) {
    for (turn, cell) in cells.iter().enumerate() {
        let mover = if turn % 2 == 0 { host } else { guest };
        coordinator.apply_move(room, mover, cell / 3, cell % 3).unwrap();
    }
}
