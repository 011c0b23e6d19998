use rand::Rng;

/// How many fresh codes a create or rematch samples before giving up.
pub const MAX_ROOM_CODE_ATTEMPTS: usize = 8;

/// Source of short, shareable room codes. Codes need not be unique; the store
/// rejects collisions and the coordinator samples again.
pub trait RoomCodeAllocator: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniformly random 6-digit numeric codes, `000000` to `999999`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomRoomCodes;

impl RoomCodeAllocator for RandomRoomCodes {
    fn generate(&self) -> String {
        format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
    }
}
