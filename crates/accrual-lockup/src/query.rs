use accrual_core::coins::Coins;
use accrual_core::error::AccrualError;
use accrual_core::lock::{LockQueryType, PeriodLock, QueryCondition};
use accrual_core::types::{AccountId, Balance, DurationSecs, LockId, Timestamp};
use accrual_state::db::{decode, prefix_end};
use accrual_state::{accumulation, bank, keys, Txn};

use crate::keeper::LockupKeeper;

fn ids_from_index(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Vec<LockId>, AccrualError> {
    entries
        .into_iter()
        .map(|(k, _)| {
            keys::trailing_id(&k).ok_or_else(|| AccrualError::Serialization("lock index key".into()))
        })
        .collect()
}

fn sum_coins<'l>(mut locks: impl Iterator<Item = &'l PeriodLock>) -> Result<Coins, AccrualError> {
    locks.try_fold(Coins::empty(), |acc, l| acc.checked_add(&l.coins))
}

impl LockupKeeper {
    pub fn get_lock_by_id(&self, txn: &Txn<'_>, id: LockId) -> Result<PeriodLock, AccrualError> {
        txn.get_lock(id)?.ok_or(AccrualError::LockNotFound(id))
    }

    fn locks_by_ids(&self, txn: &Txn<'_>, ids: Vec<LockId>) -> Result<Vec<PeriodLock>, AccrualError> {
        ids.into_iter().map(|id| self.get_lock_by_id(txn, id)).collect()
    }

    /// Every lock: locked ones by id, then unlocking ones by `(end_time, id)`.
    pub fn get_period_locks(&self, txn: &Txn<'_>) -> Result<Vec<PeriodLock>, AccrualError> {
        let mut locks = Vec::new();
        for (_, v) in txn.scan_prefix(&[keys::LOCK])? {
            let lock: PeriodLock = decode(&v)?;
            if !lock.is_unlocking() {
                locks.push(lock);
            }
        }
        let unlocking = ids_from_index(txn.scan_prefix(&keys::lock_by_end_prefix())?)?;
        locks.extend(self.locks_by_ids(txn, unlocking)?);
        Ok(locks)
    }

    /// Every lock of `owner`, in id order.
    pub fn get_account_period_locks(
        &self,
        txn: &Txn<'_>,
        owner: &AccountId,
    ) -> Result<Vec<PeriodLock>, AccrualError> {
        let ids = ids_from_index(txn.scan_prefix(&keys::lock_by_account_prefix(owner))?)?;
        self.locks_by_ids(txn, ids)
    }

    /// Locked (not unlocking) locks of `denom` with `duration >= min`, in id order.
    pub fn get_locks_longer_than_duration_denom(
        &self,
        txn: &Txn<'_>,
        denom: &str,
        min: DurationSecs,
    ) -> Result<Vec<PeriodLock>, AccrualError> {
        let prefix = keys::lock_by_duration_prefix(denom);
        let entries = txn.range(keys::lock_by_duration_from(denom, min), prefix_end(&prefix))?;
        let mut ids = ids_from_index(entries)?;
        ids.sort_unstable();
        self.locks_by_ids(txn, ids)
    }

    /// Locks of `denom` still locked past `timestamp`: every locked lock plus
    /// unlocking locks ending after `timestamp`.
    pub fn get_locks_past_time_denom(
        &self,
        txn: &Txn<'_>,
        denom: &str,
        timestamp: Timestamp,
    ) -> Result<Vec<PeriodLock>, AccrualError> {
        let mut locks = self.get_locks_longer_than_duration_denom(txn, denom, 0)?;
        let unlocking = match timestamp.checked_add(1) {
            Some(after) => {
                let prefix = keys::lock_by_denom_end_prefix(denom);
                ids_from_index(txn.range(keys::lock_by_denom_end_from(denom, after), prefix_end(&prefix))?)?
            }
            None => Vec::new(),
        };
        locks.extend(self.locks_by_ids(txn, unlocking)?);
        Ok(locks)
    }

    /// Unlocking locks of `denom` with `begin <= end_time < end`.
    pub fn get_unlockings_between_time_denom(
        &self,
        txn: &Txn<'_>,
        denom: &str,
        begin: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<PeriodLock>, AccrualError> {
        let entries = txn.range(
            keys::lock_by_denom_end_from(denom, begin),
            Some(keys::lock_by_denom_end_from(denom, end)),
        )?;
        let ids = ids_from_index(entries)?;
        self.locks_by_ids(txn, ids)
    }

    pub fn get_locks_by_condition(
        &self,
        txn: &Txn<'_>,
        condition: &QueryCondition,
    ) -> Result<Vec<PeriodLock>, AccrualError> {
        match condition.lock_query_type {
            LockQueryType::ByDuration => {
                self.get_locks_longer_than_duration_denom(txn, &condition.denom, condition.duration)
            }
            LockQueryType::ByTime => {
                self.get_locks_past_time_denom(txn, &condition.denom, condition.timestamp)
            }
        }
    }

    /// Total amount of `condition.denom` held by the locks matching `condition`.
    /// `ByDuration` reads the accumulation index; `ByTime` sums the matching locks.
    pub fn get_period_locks_accumulation(
        &self,
        txn: &Txn<'_>,
        condition: &QueryCondition,
    ) -> Result<Balance, AccrualError> {
        match condition.lock_query_type {
            LockQueryType::ByDuration => {
                accumulation::sum_at_least(txn, &condition.denom, condition.duration)
            }
            LockQueryType::ByTime => {
                let locks = self.get_locks_past_time_denom(txn, &condition.denom, condition.timestamp)?;
                Ok(sum_coins(locks.iter())?.amount_of(&condition.denom))
            }
        }
    }

    /// Coins held by locks that are not unlocking.
    pub fn get_module_locked_coins(&self, txn: &Txn<'_>) -> Result<Coins, AccrualError> {
        let locks = self.get_period_locks(txn)?;
        sum_coins(locks.iter().filter(|l| !l.is_unlocking()))
    }

    /// Everything the lockup module account holds, unlocking coins included.
    pub fn get_module_balance(&self, txn: &Txn<'_>) -> Result<Coins, AccrualError> {
        bank::get_all_balances(txn, &bank::lockup_module_account())
    }

    pub fn get_account_locked_coins(
        &self,
        txn: &Txn<'_>,
        owner: &AccountId,
    ) -> Result<Coins, AccrualError> {
        let locks = self.get_account_period_locks(txn, owner)?;
        sum_coins(locks.iter().filter(|l| !l.is_unlocking()))
    }

    /// Coins of `owner` that can be withdrawn at `now`.
    pub fn get_account_unlockable_coins(
        &self,
        txn: &Txn<'_>,
        owner: &AccountId,
        now: Timestamp,
    ) -> Result<Coins, AccrualError> {
        let locks = self.get_account_period_locks(txn, owner)?;
        sum_coins(locks.iter().filter(|l| l.is_matured(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrual_state::StateDb;

    const NOW: Timestamp = 1_700_000_000;

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    fn lock(k: &LockupKeeper, txn: &mut Txn<'_>, owner: &AccountId, c: &str, d: DurationSecs) -> PeriodLock {
        let have = bank::get_all_balances(txn, owner).unwrap();
        bank::set_balances(txn, owner, &have.checked_add(&coins(c)).unwrap());
        k.create_lock(txn, NOW, owner, coins(c), d).unwrap()
    }

    #[test]
    fn locks_past_time_denom() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let k = LockupKeeper::new();
        let a = AccountId::from_label("addr1");
        assert!(k.get_locks_past_time_denom(&txn, "stake", NOW).unwrap().is_empty());

        lock(&k, &mut txn, &a, "10stake", 1);
        lock(&k, &mut txn, &a, "10stake", 60);
        assert_eq!(k.get_locks_past_time_denom(&txn, "stake", NOW).unwrap().len(), 2);

        k.begin_unlock(&mut txn, NOW, 1).unwrap();
        // still counted until its end time passes
        assert_eq!(k.get_locks_past_time_denom(&txn, "stake", NOW).unwrap().len(), 2);
        assert_eq!(k.get_locks_past_time_denom(&txn, "stake", NOW + 1).unwrap().len(), 1);

        let by_time = QueryCondition::by_time("stake", NOW);
        assert_eq!(k.get_locks_by_condition(&txn, &by_time).unwrap().len(), 2);
        assert_eq!(k.get_period_locks_accumulation(&txn, &by_time).unwrap(), 20);
    }

    #[test]
    fn locks_longer_than_duration_denom() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let k = LockupKeeper::new();
        let a = AccountId::from_label("addr1");
        assert!(k.get_locks_longer_than_duration_denom(&txn, "stake", 1).unwrap().is_empty());

        lock(&k, &mut txn, &a, "10stake", 1);
        lock(&k, &mut txn, &a, "10stake", 5);
        lock(&k, &mut txn, &a, "10other", 5);
        assert_eq!(k.get_locks_longer_than_duration_denom(&txn, "stake", 1).unwrap().len(), 2);
        let longer = k.get_locks_longer_than_duration_denom(&txn, "stake", 2).unwrap();
        assert_eq!(longer.iter().map(|l| l.id).collect::<Vec<_>>(), vec![2]);
        assert!(k.get_locks_longer_than_duration_denom(&txn, "stake", 6).unwrap().is_empty());
    }

    #[test]
    fn unlockings_between_time_denom() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let k = LockupKeeper::new();
        let a = AccountId::from_label("addr1");
        lock(&k, &mut txn, &a, "10stake", 1);
        lock(&k, &mut txn, &a, "20stake", 3);

        let (begin, end) = (NOW + 1, NOW + 4);
        assert!(k.get_unlockings_between_time_denom(&txn, "stake", begin, end).unwrap().is_empty());

        k.begin_unlock(&mut txn, NOW, 1).unwrap();
        assert_eq!(k.get_unlockings_between_time_denom(&txn, "stake", begin, end).unwrap().len(), 1);

        k.begin_unlock(&mut txn, NOW, 2).unwrap();
        assert_eq!(k.get_unlockings_between_time_denom(&txn, "stake", begin, end).unwrap().len(), 2);

        assert_eq!(k.get_unlockings_between_time_denom(&txn, "stake", NOW + 2, end).unwrap().len(), 1);
        // end bound is exclusive
        assert_eq!(k.get_unlockings_between_time_denom(&txn, "stake", begin, NOW + 3).unwrap().len(), 1);
    }

    #[test]
    fn account_views() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let k = LockupKeeper::new();
        let a = AccountId::from_label("a");
        let b = AccountId::from_label("b");
        lock(&k, &mut txn, &a, "10stake", 1);
        lock(&k, &mut txn, &b, "7stake", 1);
        lock(&k, &mut txn, &a, "5stake", 2);

        let ids: Vec<_> = k.get_account_period_locks(&txn, &a).unwrap().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(k.get_account_locked_coins(&txn, &a).unwrap(), coins("15stake"));
        assert_eq!(k.get_module_locked_coins(&txn).unwrap(), coins("22stake"));
    }
}
