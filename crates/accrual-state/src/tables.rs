//! Typed access to the records stored in the state tree.

use accrual_core::error::AccrualError;
use accrual_core::gauge::Gauge;
use accrual_core::lock::PeriodLock;
use accrual_core::reward::{CurrentReward, HistoricalReward, PeriodLockReward};
use accrual_core::types::{DurationSecs, GaugeId, LockId};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::Txn;
use crate::keys;

pub const META_PARAMS: &str = "params";
pub const META_LOCKABLE_DURATIONS: &str = "lockable_durations";
pub const META_NEXT_LOCK_ID: &str = "next_lock_id";
pub const META_NEXT_GAUGE_ID: &str = "next_gauge_id";

impl<'a> Txn<'a> {
    // ── Locks ────────────────────────────────────────────────────────────────

    pub fn get_lock(&self, id: LockId) -> Result<Option<PeriodLock>, AccrualError> {
        self.get(&keys::lock(id))
    }

    pub fn put_lock(&mut self, lock: &PeriodLock) -> Result<(), AccrualError> {
        self.put(keys::lock(lock.id), lock)
    }

    pub fn delete_lock(&mut self, id: LockId) {
        self.delete(keys::lock(id));
    }

    // ── Gauges ───────────────────────────────────────────────────────────────

    pub fn get_gauge(&self, id: GaugeId) -> Result<Option<Gauge>, AccrualError> {
        self.get(&keys::gauge(id))
    }

    pub fn put_gauge(&mut self, gauge: &Gauge) -> Result<(), AccrualError> {
        self.put(keys::gauge(gauge.id), gauge)
    }

    // ── Rewards ──────────────────────────────────────────────────────────────

    pub fn get_current_reward(
        &self,
        denom: &str,
        duration: DurationSecs,
    ) -> Result<Option<CurrentReward>, AccrualError> {
        self.get(&keys::current_reward(denom, duration))
    }

    pub fn put_current_reward(
        &mut self,
        duration: DurationSecs,
        reward: &CurrentReward,
    ) -> Result<(), AccrualError> {
        self.put(keys::current_reward(&reward.coin.denom, duration), reward)
    }

    pub fn get_historical_reward(
        &self,
        denom: &str,
        duration: DurationSecs,
        period: u64,
    ) -> Result<Option<HistoricalReward>, AccrualError> {
        self.get(&keys::historical_reward(denom, duration, period))
    }

    /// Historical rewards are immutable: writing a period twice is an
    /// invariant violation.
    pub fn insert_historical_reward(
        &mut self,
        denom: &str,
        duration: DurationSecs,
        reward: &HistoricalReward,
    ) -> Result<(), AccrualError> {
        let key = keys::historical_reward(denom, duration, reward.period);
        if self.contains(&key)? {
            return Err(AccrualError::Invariant(format!(
                "historical reward {denom}/{duration}s period {} already written",
                reward.period
            )));
        }
        self.put(key, reward)
    }

    pub fn get_lock_reward(&self, id: LockId) -> Result<Option<PeriodLockReward>, AccrualError> {
        self.get(&keys::lock_reward(id))
    }

    pub fn put_lock_reward(&mut self, reward: &PeriodLockReward) -> Result<(), AccrualError> {
        self.put(keys::lock_reward(reward.id), reward)
    }

    pub fn delete_lock_reward(&mut self, id: LockId) {
        self.delete(keys::lock_reward(id));
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn get_meta<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AccrualError> {
        self.get(&keys::meta(name))
    }

    pub fn put_meta<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), AccrualError> {
        self.put(keys::meta(name), value)
    }

    /// Hand out the next identifier from counter `name`. Identifiers start at 1.
    pub fn next_id(&mut self, name: &str) -> Result<u64, AccrualError> {
        let id = self.peek_id(name)?;
        let next = id
            .checked_add(1)
            .ok_or_else(|| AccrualError::Overflow(format!("counter {name}")))?;
        self.put_meta(name, &next)?;
        Ok(id)
    }

    pub fn peek_id(&self, name: &str) -> Result<u64, AccrualError> {
        Ok(self.get_meta::<u64>(name)?.unwrap_or(1))
    }

    /// Make sure counter `name` will never hand out `id` or anything below it.
    pub fn bump_id_past(&mut self, name: &str, id: u64) -> Result<(), AccrualError> {
        if self.peek_id(name)? <= id {
            let next = id
                .checked_add(1)
                .ok_or_else(|| AccrualError::Overflow(format!("counter {name}")))?;
            self.put_meta(name, &next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StateDb;
    use accrual_core::coins::DecCoins;

    #[test]
    fn counters_start_at_one_and_bump() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        assert_eq!(txn.next_id(META_NEXT_LOCK_ID).unwrap(), 1);
        assert_eq!(txn.next_id(META_NEXT_LOCK_ID).unwrap(), 2);
        txn.bump_id_past(META_NEXT_LOCK_ID, 10).unwrap();
        assert_eq!(txn.next_id(META_NEXT_LOCK_ID).unwrap(), 11);
        txn.bump_id_past(META_NEXT_LOCK_ID, 3).unwrap();
        assert_eq!(txn.peek_id(META_NEXT_LOCK_ID).unwrap(), 12);
    }

    #[test]
    fn historical_rewards_are_write_once() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let h = HistoricalReward { cumulative_reward_ratio: DecCoins::empty(), period: 0, epoch: 1 };
        txn.insert_historical_reward("stake", 86_400, &h).unwrap();
        let err = txn.insert_historical_reward("stake", 86_400, &h).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(txn.get_historical_reward("stake", 86_400, 0).unwrap(), Some(h));
    }
}
