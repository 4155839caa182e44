//! accrual-node
//!
//! Wires the keepers together over one state database and runs every event
//! in its own transaction: an event either commits all of its writes or,
//! on any error, none of them.

use std::path::Path;
use std::sync::Arc;

use accrual_core::coins::{Coins, DecCoins};
use accrual_core::error::AccrualError;
use accrual_core::lock::PeriodLock;
use accrual_core::types::{AccountId, DurationSecs, LockId, Timestamp};
use accrual_epochs::EpochsKeeper;
use accrual_incentives::{DistributionEpochHook, IncentivesKeeper, LockRewardHook};
use accrual_lockup::LockupKeeper;
use accrual_state::{StateDb, Txn};
use tracing::{debug, error, warn};

/// The assembled state machine.
pub struct App {
    db: Arc<StateDb>,
    pub lockup: LockupKeeper,
    pub incentives: IncentivesKeeper,
    pub epochs: EpochsKeeper,
}

impl App {
    pub fn new(db: Arc<StateDb>) -> Self {
        let incentives = IncentivesKeeper::new();
        let lockup = LockupKeeper::new().with_hook(Arc::new(LockRewardHook::new(incentives.clone())));
        let epochs = EpochsKeeper::new().with_hook(Arc::new(DistributionEpochHook::new(incentives.clone())));
        Self { db, lockup, incentives, epochs }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AccrualError> {
        Ok(Self::new(Arc::new(StateDb::open(path)?)))
    }

    pub fn db(&self) -> &StateDb {
        &self.db
    }

    /// Run one event and commit it if it succeeds.
    pub fn execute<T>(
        &self,
        event: impl FnOnce(&Self, &mut Txn<'_>) -> Result<T, AccrualError>,
    ) -> Result<T, AccrualError> {
        let mut txn = self.db.begin();
        match event(self, &mut txn) {
            Ok(out) => {
                txn.commit()?;
                Ok(out)
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "fatal error, event discarded");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "event rejected");
                Err(e)
            }
        }
    }

    /// Read-only access; nothing is ever committed.
    pub fn query<T>(&self, read: impl FnOnce(&Self, &Txn<'_>) -> Result<T, AccrualError>) -> Result<T, AccrualError> {
        let txn = self.db.begin();
        read(self, &txn)
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Start of a block at time `now`: withdraw matured locks, then advance
    /// the epoch clocks (which may distribute gauges).
    pub fn begin_block(&self, now: Timestamp) -> Result<(), AccrualError> {
        self.execute(|app, txn| {
            let withdrawn = app.lockup.withdraw_all_matured_locks(txn, now)?;
            app.epochs.begin_block(txn, now)?;
            debug!(now, withdrawn = withdrawn.len(), "block processed");
            Ok(())
        })
    }

    pub fn lock_tokens(
        &self,
        now: Timestamp,
        owner: &AccountId,
        coins: Coins,
        duration: DurationSecs,
    ) -> Result<PeriodLock, AccrualError> {
        self.execute(|app, txn| app.lockup.lock_tokens(txn, now, owner, coins, duration))
    }

    /// Begin unlocking all of a lock, or only `coins` of it when given.
    pub fn begin_unlock(
        &self,
        now: Timestamp,
        owner: &AccountId,
        lock_id: LockId,
        coins: Option<Coins>,
    ) -> Result<PeriodLock, AccrualError> {
        self.execute(|app, txn| {
            let lock = owned_lock(app, txn, owner, lock_id)?;
            match coins {
                Some(coins) => Ok(app.lockup.begin_partial_unlock(txn, now, lock_id, &coins)?.1),
                None => app.lockup.begin_unlock_lock(txn, now, lock),
            }
        })
    }

    pub fn withdraw(&self, now: Timestamp, owner: &AccountId, lock_id: LockId) -> Result<PeriodLock, AccrualError> {
        self.execute(|app, txn| {
            let lock = owned_lock(app, txn, owner, lock_id)?;
            app.lockup.unlock_lock(txn, now, lock)
        })
    }

    pub fn claim(&self, owner: &AccountId, lock_id: LockId, recipient: &AccountId) -> Result<Coins, AccrualError> {
        self.execute(|app, txn| app.incentives.claim_lock_reward(txn, owner, lock_id, recipient))
    }

    pub fn estimate(&self, lock_id: LockId) -> Result<DecCoins, AccrualError> {
        self.query(|app, txn| {
            let lock = app.lockup.get_lock_by_id(txn, lock_id)?;
            app.incentives.estimate_lock_reward(txn, &lock)
        })
    }
}

fn owned_lock(app: &App, txn: &Txn<'_>, owner: &AccountId, lock_id: LockId) -> Result<PeriodLock, AccrualError> {
    let lock = app.lockup.get_lock_by_id(txn, lock_id)?;
    if &lock.owner != owner {
        return Err(AccrualError::NotLockOwner { lock_id, caller: owner.to_string() });
    }
    Ok(lock)
}
