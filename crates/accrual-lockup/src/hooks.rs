use accrual_core::coins::Coins;
use accrual_core::error::AccrualError;
use accrual_core::types::{AccountId, DurationSecs, LockId, Timestamp};
use accrual_state::Txn;

/// A change to the coins a lock holds in the reward pool.
#[derive(Clone, Debug)]
pub struct LockEvent<'e> {
    pub owner: &'e AccountId,
    pub lock_id: LockId,
    /// Coins that entered (locked) or left (unlocked) the pool.
    pub coins: &'e Coins,
    pub duration: DurationSecs,
    /// End time of the lock, set once it has begun unlocking.
    pub unlock_time: Option<Timestamp>,
}

/// Observers of the lock ledger. Called inside the event's transaction after
/// the ledger has written its own changes; an error aborts the whole event.
pub trait LockupHooks {
    /// `event.coins` were added to a lock that stays in the reward pool.
    fn on_token_locked(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        event: &LockEvent<'_>,
    ) -> Result<(), AccrualError>;

    /// `event.coins` left the reward pool: the lock began unlocking, or part
    /// of it was split off to unlock.
    fn on_token_unlocked(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        event: &LockEvent<'_>,
    ) -> Result<(), AccrualError>;
}
