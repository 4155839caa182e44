//! Registrations connecting the incentives module to the epoch clock and
//! the lock ledger.

use accrual_core::error::AccrualError;
use accrual_core::types::Timestamp;
use accrual_epochs::EpochHooks;
use accrual_lockup::{LockEvent, LockupHooks};
use accrual_state::Txn;
use tracing::error;

use crate::distribution::LockChange;
use crate::keeper::IncentivesKeeper;

/// Pays gauges at the end of every distribution epoch.
pub struct DistributionEpochHook {
    keeper: IncentivesKeeper,
}

impl DistributionEpochHook {
    pub fn new(keeper: IncentivesKeeper) -> Self {
        Self { keeper }
    }
}

impl EpochHooks for DistributionEpochHook {
    fn after_epoch_end(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        identifier: &str,
        epoch_number: i64,
    ) -> Result<(), AccrualError> {
        let params = self.keeper.get_params(txn)?;
        if identifier != params.distr_epoch_identifier {
            return Ok(());
        }
        self.keeper.distribute_epoch(txn, now, epoch_number).map(|_| ()).map_err(|e| {
            error!(identifier, epoch = epoch_number, error = %e, "epoch distribution failed");
            match e {
                AccrualError::EpochProcessing(_) => e,
                other => AccrualError::EpochProcessing(format!("{identifier} epoch {epoch_number}: {other}")),
            }
        })
    }

    fn before_epoch_start(
        &self,
        _txn: &mut Txn<'_>,
        _now: Timestamp,
        _identifier: &str,
        _epoch_number: i64,
    ) -> Result<(), AccrualError> {
        Ok(())
    }
}

/// Keeps reward buckets and per-lock reward records in step with the ledger.
pub struct LockRewardHook {
    keeper: IncentivesKeeper,
}

impl LockRewardHook {
    pub fn new(keeper: IncentivesKeeper) -> Self {
        Self { keeper }
    }
}

impl LockupHooks for LockRewardHook {
    fn on_token_locked(
        &self,
        txn: &mut Txn<'_>,
        _now: Timestamp,
        event: &LockEvent<'_>,
    ) -> Result<(), AccrualError> {
        self.keeper.on_lock_change(txn, event, LockChange::Entered)
    }

    fn on_token_unlocked(
        &self,
        txn: &mut Txn<'_>,
        _now: Timestamp,
        event: &LockEvent<'_>,
    ) -> Result<(), AccrualError> {
        self.keeper.on_lock_change(txn, event, LockChange::Left)
    }
}
