use serde::{Deserialize, Serialize};

use crate::coins::{Coin, Coins, DecCoins};
use crate::error::AccrualError;
use crate::lock::BucketKey;
use crate::types::{DurationSecs, LockId};

/// Rewards credited to a bucket for one distribution epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochPayout {
    pub epoch: i64,
    pub coins: Coins,
}

/// Accumulator for the open period of one bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentReward {
    /// Amount of the bucket's denom currently locked into the bucket.
    pub coin: Coin,
    /// Epoch payouts credited since the last close, in epoch order.
    pub pending: Vec<EpochPayout>,
    /// Index of the period the next close will write.
    pub period: u64,
    pub last_processed_epoch: i64,
    /// Set when payouts are waiting to be folded into historical rewards.
    pub is_new_epoch: bool,
}

impl CurrentReward {
    pub fn new(denom: impl Into<String>) -> Self {
        Self {
            coin: Coin::new(denom, 0),
            pending: Vec::new(),
            period: 0,
            last_processed_epoch: 0,
            is_new_epoch: false,
        }
    }

    /// Sum of every pending payout.
    pub fn rewards(&self) -> Result<Coins, AccrualError> {
        self.pending
            .iter()
            .try_fold(Coins::empty(), |acc, p| acc.checked_add(&p.coins))
    }
}

/// Cumulative reward per locked unit at the close of a period. Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalReward {
    pub cumulative_reward_ratio: DecCoins,
    pub period: u64,
    pub epoch: i64,
}

/// Where a lock last synced against one bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedPeriod {
    pub denom: String,
    pub duration: DurationSecs,
    pub period: u64,
}

/// Rewards owed to a lock and its sync position in every bucket it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodLockReward {
    pub id: LockId,
    pub synced: Vec<SyncedPeriod>,
    pub rewards: DecCoins,
}

impl PeriodLockReward {
    pub fn new(id: LockId) -> Self {
        Self { id, synced: Vec::new(), rewards: DecCoins::empty() }
    }

    /// Last synced period for `bucket`, or `None` when never synced.
    pub fn synced_period(&self, bucket: &BucketKey) -> Option<u64> {
        self.synced
            .iter()
            .find(|s| s.denom == bucket.denom && s.duration == bucket.duration)
            .map(|s| s.period)
    }

    pub fn set_synced_period(&mut self, bucket: &BucketKey, period: u64) {
        match self
            .synced
            .iter_mut()
            .find(|s| s.denom == bucket.denom && s.duration == bucket.duration)
        {
            Some(s) => s.period = period,
            None => {
                self.synced.push(SyncedPeriod {
                    denom: bucket.denom.clone(),
                    duration: bucket.duration,
                    period,
                });
                self.synced.sort_by(|a, b| (&a.denom, a.duration).cmp(&(&b.denom, b.duration)));
            }
        }
    }
}
