use std::collections::BTreeSet;

use accrual_core::error::AccrualError;
use accrual_core::params::Params;
use accrual_core::reward::CurrentReward;
use accrual_core::types::DurationSecs;
use accrual_lockup::LockupKeeper;
use accrual_state::tables::{META_LOCKABLE_DURATIONS, META_PARAMS};
use accrual_state::{accumulation, Txn};
use tracing::info;

/// Incentives module: gauges, reward buckets and per-lock reward records.
///
/// Holds its own hookless view of the lock ledger for reads; it never
/// creates or moves locks itself.
#[derive(Default, Clone)]
pub struct IncentivesKeeper {
    pub(crate) lockup: LockupKeeper,
}

impl IncentivesKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Params ───────────────────────────────────────────────────────────────

    pub fn get_params(&self, txn: &Txn<'_>) -> Result<Params, AccrualError> {
        Ok(txn.get_meta(META_PARAMS)?.unwrap_or_default())
    }

    pub fn set_params(&self, txn: &mut Txn<'_>, params: &Params) -> Result<(), AccrualError> {
        if params.distr_epoch_identifier.is_empty() {
            return Err(AccrualError::InvalidGenesis("empty distribution epoch identifier".into()));
        }
        txn.put_meta(META_PARAMS, params)
    }

    // ── Lockable durations ───────────────────────────────────────────────────

    /// Bucket durations, ascending.
    pub fn get_lockable_durations(&self, txn: &Txn<'_>) -> Result<Vec<DurationSecs>, AccrualError> {
        Ok(txn.get_meta(META_LOCKABLE_DURATIONS)?.unwrap_or_default())
    }

    /// Replace the lockable durations. The new set must keep every duration
    /// already configured; buckets for added durations start from the
    /// amount currently locked for at least that long.
    pub fn set_lockable_durations(
        &self,
        txn: &mut Txn<'_>,
        durations: Vec<DurationSecs>,
    ) -> Result<(), AccrualError> {
        if let Some(bad) = durations.iter().find(|d| **d < 0) {
            return Err(AccrualError::InvalidDuration(*bad));
        }
        let next: BTreeSet<DurationSecs> = durations.into_iter().collect();
        let current = self.get_lockable_durations(txn)?;
        if let Some(removed) = current.iter().find(|d| !next.contains(d)) {
            return Err(AccrualError::InvalidDuration(*removed));
        }

        let added: Vec<DurationSecs> = next.iter().copied().filter(|d| !current.contains(d)).collect();
        if !added.is_empty() {
            let denoms: BTreeSet<String> = self
                .lockup
                .get_period_locks(txn)?
                .into_iter()
                .filter(|l| !l.is_unlocking())
                .flat_map(|l| l.coins.denoms().map(str::to_string).collect::<Vec<_>>())
                .collect();
            for &duration in &added {
                for denom in &denoms {
                    if txn.get_current_reward(denom, duration)?.is_some() {
                        continue;
                    }
                    let mut reward = CurrentReward::new(denom.clone());
                    reward.coin.amount = accumulation::sum_at_least(txn, denom, duration)?;
                    txn.put_current_reward(duration, &reward)?;
                }
            }
        }

        let next: Vec<DurationSecs> = next.into_iter().collect();
        txn.put_meta(META_LOCKABLE_DURATIONS, &next)?;
        info!(durations = ?next, added = ?added, "lockable durations set");
        Ok(())
    }

    /// Lockable durations a lock of `lock_duration` qualifies for.
    pub fn eligible_durations(
        &self,
        txn: &Txn<'_>,
        lock_duration: DurationSecs,
    ) -> Result<Vec<DurationSecs>, AccrualError> {
        Ok(self
            .get_lockable_durations(txn)?
            .into_iter()
            .take_while(|d| *d <= lock_duration)
            .collect())
    }
}
