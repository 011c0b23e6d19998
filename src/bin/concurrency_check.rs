//! Fires a burst of simultaneous moves at a single cell of one room and
//! reports how many were accepted. A correct coordinator accepts exactly one.

use std::sync::{Arc, Barrier};
use std::thread;
use anyhow::bail;
use clap::Parser;
use tictactoe_rooms::{MatchCoordinator, MatchError};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "concurrency-check", about = "Race concurrent moves against one room")]
struct Args {
    /// Number of concurrent move attempts.
    #[arg(short, long, default_value_t = 20)]
    attempts: usize,

    /// SQLite database file; an in-memory store is used when omitted.
    #[arg(long)]
    database: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let coordinator = match &args.database {
        Some(path) => MatchCoordinator::with_db(path)?,
        None => MatchCoordinator::in_memory(),
    };

    let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
    let room = coordinator.create_match(host)?.room_code;
    coordinator.join_match(&room, guest)?;
    println!("room {} ready, firing {} moves at (1, 1)", room, args.attempts);

    let barrier = Arc::new(Barrier::new(args.attempts));
    let handles: Vec<_> = (0..args.attempts)
        .map(|_| {
            let coordinator = coordinator.clone();
            let barrier = Arc::clone(&barrier);
            let room = room.clone();
            thread::spawn(move || {
                barrier.wait();
                coordinator.apply_move(&room, host, 1, 1)
            })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected: Vec<MatchError> = Vec::new();
    for handle in handles {
        match handle.join() {
            Ok(Ok(_)) => accepted += 1,
            Ok(Err(err)) => rejected.push(err),
            Err(_) => bail!("move thread panicked"),
        }
    }

    let logged = coordinator.move_history(&room)?.len();
    println!("accepted: {}", accepted);
    println!("rejected: {}", rejected.len());
    for kind in ["turn_violation", "cell_occupied"] {
        let count = rejected.iter().filter(|err| err.kind() == kind).count();
        if count > 0 {
            println!("  {}: {}", kind, count);
        }
    }
    println!("moves in log: {}", logged);

    if accepted != 1 || logged != 1 {
        bail!("expected exactly one accepted move, got {} accepted and {} logged", accepted, logged);
    }
    println!("OK");
    Ok(())
}
