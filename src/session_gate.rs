use crate::record::PlayerId;
use crate::result::MatchError;
use crate::store::MatchTx;

/// Refuses to seat a player who already has a `WAITING` or `IN_PROGRESS`
/// match. Runs inside the caller's transaction; the stores additionally reject
/// a commit that would break the rule, which closes the window between this
/// read and the write.
pub fn ensure_no_active_match(tx: &mut dyn MatchTx, player: PlayerId) -> Result<(), MatchError> {
    let active = tx.count_active(player)?;
    if active > 0 {
        tracing::debug!(%player, active, "session gate refused player");
        return Err(MatchError::ActiveSessionConflict(player));
    }
    Ok(())
}
