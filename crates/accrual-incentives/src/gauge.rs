use accrual_core::coins::Coins;
use accrual_core::error::AccrualError;
use accrual_core::gauge::{Gauge, GaugeStatus};
use accrual_core::lock::{LockQueryType, QueryCondition};
use accrual_core::types::{AccountId, GaugeId, Timestamp};
use accrual_state::tables::META_NEXT_GAUGE_ID;
use accrual_state::{bank, keys, Txn};
use tracing::{debug, info};

use crate::keeper::IncentivesKeeper;

const STATUSES: [GaugeStatus; 3] = [GaugeStatus::Upcoming, GaugeStatus::Active, GaugeStatus::Finished];

impl IncentivesKeeper {
    // ── Creation / funding ───────────────────────────────────────────────────

    /// Escrow `coins` from `owner` into a new gauge paying the bucket
    /// selected by `distribute_to`. The gauge starts out upcoming.
    pub fn create_gauge(
        &self,
        txn: &mut Txn<'_>,
        is_perpetual: bool,
        owner: &AccountId,
        coins: Coins,
        distribute_to: QueryCondition,
        start_time: Timestamp,
        num_epochs_paid_over: u64,
    ) -> Result<GaugeId, AccrualError> {
        if distribute_to.lock_query_type != LockQueryType::ByDuration {
            return Err(AccrualError::InvalidGauge("only duration buckets can be paid".into()));
        }
        if !self.get_lockable_durations(txn)?.contains(&distribute_to.duration) {
            return Err(AccrualError::DurationNotLockable(distribute_to.duration));
        }
        if coins.is_empty() {
            return Err(AccrualError::InvalidCoins("gauge needs funding".into()));
        }
        if !is_perpetual && num_epochs_paid_over == 0 {
            return Err(AccrualError::InvalidGauge("finite gauge must pay over at least one epoch".into()));
        }

        bank::send_coins(txn, owner, &bank::incentives_module_account(), &coins)?;
        let id = txn.next_id(META_NEXT_GAUGE_ID)?;
        let gauge = Gauge {
            id,
            is_perpetual,
            distribute_to,
            coins,
            start_time,
            num_epochs_paid_over,
            filled_epochs: 0,
            distributed_coins: Coins::empty(),
        };
        self.store_gauge(txn, &gauge, GaugeStatus::Upcoming)?;

        info!(
            gauge_id = id,
            owner = %owner,
            coins = %gauge.coins,
            bucket = %gauge.distribute_to.bucket(),
            perpetual = is_perpetual,
            epochs = num_epochs_paid_over,
            "gauge created"
        );
        Ok(id)
    }

    /// Add funding to a gauge that has not finished.
    pub fn add_to_gauge_rewards(
        &self,
        txn: &mut Txn<'_>,
        owner: &AccountId,
        coins: Coins,
        gauge_id: GaugeId,
    ) -> Result<Gauge, AccrualError> {
        if coins.is_empty() {
            return Err(AccrualError::InvalidCoins("no coins to add".into()));
        }
        let mut gauge = self.get_gauge_by_id(txn, gauge_id)?;
        if self.gauge_status(txn, gauge_id)? == GaugeStatus::Finished {
            return Err(AccrualError::GaugeAlreadyFinished(gauge_id));
        }
        bank::send_coins(txn, owner, &bank::incentives_module_account(), &coins)?;
        gauge.coins = gauge.coins.checked_add(&coins)?;
        txn.put_gauge(&gauge)?;
        info!(gauge_id, added = %coins, total = %gauge.coins, "gauge funded");
        Ok(gauge)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    fn store_gauge(&self, txn: &mut Txn<'_>, gauge: &Gauge, status: GaugeStatus) -> Result<(), AccrualError> {
        txn.put_gauge(gauge)?;
        txn.put_raw(keys::gauge_by_status(status, gauge.id), Vec::new());
        Ok(())
    }

    fn move_gauge(&self, txn: &mut Txn<'_>, id: GaugeId, from: GaugeStatus, to: GaugeStatus) {
        txn.delete(keys::gauge_by_status(from, id));
        txn.put_raw(keys::gauge_by_status(to, id), Vec::new());
    }

    pub fn gauge_status(&self, txn: &Txn<'_>, id: GaugeId) -> Result<GaugeStatus, AccrualError> {
        for status in STATUSES {
            if txn.contains(&keys::gauge_by_status(status, id))? {
                return Ok(status);
            }
        }
        Err(AccrualError::GaugeNotFound(id))
    }

    pub fn begin_distribution(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        gauge_id: GaugeId,
    ) -> Result<Gauge, AccrualError> {
        let gauge = self.get_gauge_by_id(txn, gauge_id)?;
        match self.gauge_status(txn, gauge_id)? {
            GaugeStatus::Active => return Err(AccrualError::GaugeAlreadyActive(gauge_id)),
            GaugeStatus::Finished => return Err(AccrualError::GaugeAlreadyFinished(gauge_id)),
            GaugeStatus::Upcoming => {}
        }
        if now < gauge.start_time {
            return Err(AccrualError::GaugeNotStarted { gauge_id, start_time: gauge.start_time });
        }
        self.move_gauge(txn, gauge_id, GaugeStatus::Upcoming, GaugeStatus::Active);
        info!(gauge_id, "gauge active");
        Ok(gauge)
    }

    pub fn finish_distribution(&self, txn: &mut Txn<'_>, gauge_id: GaugeId) -> Result<Gauge, AccrualError> {
        let gauge = self.get_gauge_by_id(txn, gauge_id)?;
        if self.gauge_status(txn, gauge_id)? != GaugeStatus::Active {
            return Err(AccrualError::GaugeNotActive(gauge_id));
        }
        if gauge.is_perpetual {
            return Err(AccrualError::InvalidGauge(format!("perpetual gauge {gauge_id} never finishes")));
        }
        if !gauge.is_filled() {
            return Err(AccrualError::GaugeNotFilled {
                gauge_id,
                filled: gauge.filled_epochs,
                num_epochs: gauge.num_epochs_paid_over,
            });
        }
        self.move_gauge(txn, gauge_id, GaugeStatus::Active, GaugeStatus::Finished);
        info!(gauge_id, distributed = %gauge.distributed_coins, "gauge finished");
        Ok(gauge)
    }

    // ── Distribution ─────────────────────────────────────────────────────────

    /// Queue this epoch's share of `gauge` on its bucket and record it as
    /// distributed. Returns the credited coins.
    ///
    /// An empty bucket receives nothing and the epoch does not count, so
    /// the coins carry over to a later epoch.
    pub fn f1_distribute(
        &self,
        txn: &mut Txn<'_>,
        gauge: &mut Gauge,
        epoch: i64,
    ) -> Result<Coins, AccrualError> {
        let bucket = gauge.distribute_to.bucket();
        let locked = txn
            .get_current_reward(&bucket.denom, bucket.duration)?
            .map_or(0, |c| c.coin.amount);
        if locked == 0 {
            debug!(gauge_id = gauge.id, bucket = %bucket, epoch, "nothing locked, payout carried");
            return Ok(Coins::empty());
        }

        let remaining = gauge.remaining()?;
        let payout = if gauge.is_perpetual {
            remaining
        } else {
            let epochs_left = gauge.num_epochs_paid_over.saturating_sub(gauge.filled_epochs).max(1);
            remaining.quo_int(u128::from(epochs_left))
        };
        if gauge.is_perpetual && payout.is_empty() {
            return Ok(payout);
        }

        if !payout.is_empty() {
            self.credit_bucket(txn, &bucket, epoch, &payout)?;
            gauge.distributed_coins = gauge.distributed_coins.checked_add(&payout)?;
        }
        if !gauge.is_perpetual {
            gauge.filled_epochs += 1;
        }
        txn.put_gauge(gauge)?;
        debug!(
            gauge_id = gauge.id,
            bucket = %bucket,
            epoch,
            payout = %payout,
            filled = gauge.filled_epochs,
            "gauge distributed"
        );
        Ok(payout)
    }

    /// End-of-epoch distribution: start gauges whose time has come, pay
    /// every active gauge in id order and retire the finite ones that are done.
    pub fn distribute_epoch(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        epoch: i64,
    ) -> Result<Coins, AccrualError> {
        for gauge in self.get_upcoming_gauges(txn)? {
            if now >= gauge.start_time {
                self.begin_distribution(txn, now, gauge.id)?;
            }
        }

        let mut total = Coins::empty();
        for mut gauge in self.get_active_gauges(txn)? {
            let paid = self.f1_distribute(txn, &mut gauge, epoch)?;
            total = total.checked_add(&paid)?;
            if gauge.is_filled() {
                self.finish_distribution(txn, gauge.id)?;
            }
        }
        info!(epoch, distributed = %total, "epoch rewards distributed");
        Ok(total)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get_gauge_by_id(&self, txn: &Txn<'_>, id: GaugeId) -> Result<Gauge, AccrualError> {
        txn.get_gauge(id)?.ok_or(AccrualError::GaugeNotFound(id))
    }

    /// Every gauge, in id order.
    pub fn get_gauges(&self, txn: &Txn<'_>) -> Result<Vec<Gauge>, AccrualError> {
        txn.scan_prefix(&[keys::GAUGE])?
            .into_iter()
            .map(|(_, v)| accrual_state::db::decode(&v))
            .collect()
    }

    fn gauges_with_status(&self, txn: &Txn<'_>, status: GaugeStatus) -> Result<Vec<Gauge>, AccrualError> {
        txn.scan_prefix(&keys::gauge_by_status_prefix(status))?
            .into_iter()
            .map(|(k, _)| {
                let id = keys::trailing_id(&k)
                    .ok_or_else(|| AccrualError::Serialization("gauge status key".into()))?;
                self.get_gauge_by_id(txn, id)
            })
            .collect()
    }

    pub fn get_upcoming_gauges(&self, txn: &Txn<'_>) -> Result<Vec<Gauge>, AccrualError> {
        self.gauges_with_status(txn, GaugeStatus::Upcoming)
    }

    pub fn get_active_gauges(&self, txn: &Txn<'_>) -> Result<Vec<Gauge>, AccrualError> {
        self.gauges_with_status(txn, GaugeStatus::Active)
    }

    pub fn get_finished_gauges(&self, txn: &Txn<'_>) -> Result<Vec<Gauge>, AccrualError> {
        self.gauges_with_status(txn, GaugeStatus::Finished)
    }

    /// Coins still owed by upcoming and active gauges.
    pub fn get_module_to_distribute_coins(&self, txn: &Txn<'_>) -> Result<Coins, AccrualError> {
        let mut total = Coins::empty();
        for gauge in self.get_upcoming_gauges(txn)?.iter().chain(self.get_active_gauges(txn)?.iter()) {
            total = total.checked_add(&gauge.remaining()?)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrual_core::constants::SECS_PER_DAY;
    use std::sync::Arc;

    use accrual_core::types::DurationSecs;
    use accrual_lockup::LockupKeeper;
    use accrual_state::StateDb;

    use crate::hooks::LockRewardHook;

    const NOW: Timestamp = 1_700_000_000;
    const DAY: DurationSecs = SECS_PER_DAY;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    fn setup(txn: &mut Txn<'_>) -> (IncentivesKeeper, LockupKeeper, AccountId) {
        let k = IncentivesKeeper::new();
        let lockup = LockupKeeper::new().with_hook(Arc::new(LockRewardHook::new(k.clone())));
        k.set_lockable_durations(txn, vec![DAY]).unwrap();
        let funder = AccountId::from_label("funder");
        bank::set_balances(txn, &funder, &coins("10000stake,100foo"));
        (k, lockup, funder)
    }

    fn lock_some(lockup: &LockupKeeper, txn: &mut Txn<'_>, label: &str, c: &str) {
        let owner = AccountId::from_label(label);
        bank::set_balances(txn, &owner, &coins(c));
        lockup.create_lock(txn, NOW, &owner, coins(c), DAY).unwrap();
    }

    fn pending(k: &IncentivesKeeper, txn: &Txn<'_>) -> Coins {
        k.get_current_reward(txn, "stake", DAY).unwrap().rewards().unwrap()
    }

    // ── Creation ──────────────────────────────────────────────────────────────

    #[test]
    fn create_gauge_escrows_coins() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, _, funder) = setup(&mut txn);

        let id = k
            .create_gauge(&mut txn, false, &funder, coins("100stake"), QueryCondition::by_duration("stake", DAY), NOW, 2)
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(k.gauge_status(&txn, id).unwrap(), GaugeStatus::Upcoming);
        assert_eq!(bank::get_balance(&txn, &bank::incentives_module_account(), "stake").unwrap(), 100);
        assert_eq!(k.get_module_to_distribute_coins(&txn).unwrap(), coins("100stake"));

        k.add_to_gauge_rewards(&mut txn, &funder, coins("50stake,5foo"), id).unwrap();
        assert_eq!(k.get_gauge_by_id(&txn, id).unwrap().coins, coins("150stake,5foo"));
        assert_eq!(k.get_gauges(&txn).unwrap().len(), 1);
    }

    #[test]
    fn create_gauge_validates() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, _, funder) = setup(&mut txn);
        let by_day = QueryCondition::by_duration("stake", DAY);

        assert!(matches!(
            k.create_gauge(&mut txn, false, &funder, coins("1stake"), QueryCondition::by_time("stake", NOW), NOW, 1),
            Err(AccrualError::InvalidGauge(_))
        ));
        assert!(matches!(
            k.create_gauge(&mut txn, false, &funder, coins("1stake"), QueryCondition::by_duration("stake", 2 * DAY), NOW, 1),
            Err(AccrualError::DurationNotLockable(_))
        ));
        assert!(matches!(
            k.create_gauge(&mut txn, false, &funder, Coins::empty(), by_day.clone(), NOW, 1),
            Err(AccrualError::InvalidCoins(_))
        ));
        assert!(matches!(
            k.create_gauge(&mut txn, false, &funder, coins("1stake"), by_day.clone(), NOW, 0),
            Err(AccrualError::InvalidGauge(_))
        ));
        assert!(matches!(
            k.create_gauge(&mut txn, true, &funder, coins("1000000stake"), by_day, NOW, 0),
            Err(AccrualError::InsufficientBalance { .. })
        ));
        assert!(k.get_gauges(&txn).unwrap().is_empty());
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[test]
    fn status_transitions() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, _, funder) = setup(&mut txn);
        let by_day = QueryCondition::by_duration("stake", DAY);
        let id = k.create_gauge(&mut txn, false, &funder, coins("10stake"), by_day, NOW + 10, 1).unwrap();

        assert!(matches!(
            k.begin_distribution(&mut txn, NOW, id),
            Err(AccrualError::GaugeNotStarted { .. })
        ));
        assert!(matches!(k.finish_distribution(&mut txn, id), Err(AccrualError::GaugeNotActive(_))));

        k.begin_distribution(&mut txn, NOW + 10, id).unwrap();
        assert_eq!(k.get_active_gauges(&txn).unwrap().len(), 1);
        assert!(k.get_upcoming_gauges(&txn).unwrap().is_empty());
        assert!(matches!(
            k.begin_distribution(&mut txn, NOW + 10, id),
            Err(AccrualError::GaugeAlreadyActive(_))
        ));
        assert!(matches!(
            k.finish_distribution(&mut txn, id),
            Err(AccrualError::GaugeNotFilled { filled: 0, num_epochs: 1, .. })
        ));

        let mut gauge = k.get_gauge_by_id(&txn, id).unwrap();
        gauge.filled_epochs = 1;
        txn.put_gauge(&gauge).unwrap();
        k.finish_distribution(&mut txn, id).unwrap();
        assert_eq!(k.get_finished_gauges(&txn).unwrap().len(), 1);
        assert!(matches!(
            k.begin_distribution(&mut txn, NOW + 10, id),
            Err(AccrualError::GaugeAlreadyFinished(_))
        ));
        assert!(matches!(
            k.add_to_gauge_rewards(&mut txn, &funder, coins("1stake"), id),
            Err(AccrualError::GaugeAlreadyFinished(_))
        ));
        assert!(matches!(k.gauge_status(&txn, 42), Err(AccrualError::GaugeNotFound(42))));
    }

    #[test]
    fn perpetual_gauge_never_finishes() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, _, funder) = setup(&mut txn);
        let id = k
            .create_gauge(&mut txn, true, &funder, coins("10stake"), QueryCondition::by_duration("stake", DAY), NOW, 0)
            .unwrap();
        k.begin_distribution(&mut txn, NOW, id).unwrap();
        assert!(matches!(k.finish_distribution(&mut txn, id), Err(AccrualError::InvalidGauge(_))));
    }

    // ── Distribution ──────────────────────────────────────────────────────────

    #[test]
    fn finite_gauge_splits_evenly_and_finishes() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, lockup, funder) = setup(&mut txn);
        lock_some(&lockup, &mut txn, "alice", "10stake");
        let id = k
            .create_gauge(&mut txn, false, &funder, coins("100stake"), QueryCondition::by_duration("stake", DAY), NOW, 3)
            .unwrap();

        assert_eq!(k.distribute_epoch(&mut txn, NOW, 1).unwrap(), coins("33stake"));
        assert_eq!(k.distribute_epoch(&mut txn, NOW, 2).unwrap(), coins("33stake"));
        assert_eq!(k.gauge_status(&txn, id).unwrap(), GaugeStatus::Active);
        assert_eq!(k.distribute_epoch(&mut txn, NOW, 3).unwrap(), coins("34stake"));

        let gauge = k.get_gauge_by_id(&txn, id).unwrap();
        assert_eq!(gauge.filled_epochs, 3);
        assert_eq!(gauge.distributed_coins, coins("100stake"));
        assert_eq!(k.gauge_status(&txn, id).unwrap(), GaugeStatus::Finished);
        assert!(k.get_module_to_distribute_coins(&txn).unwrap().is_empty());
        assert_eq!(pending(&k, &txn), coins("100stake"));
    }

    #[test]
    fn empty_bucket_carries_payout() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, lockup, funder) = setup(&mut txn);
        let id = k
            .create_gauge(&mut txn, false, &funder, coins("100stake"), QueryCondition::by_duration("stake", DAY), NOW, 2)
            .unwrap();

        assert!(k.distribute_epoch(&mut txn, NOW, 1).unwrap().is_empty());
        let gauge = k.get_gauge_by_id(&txn, id).unwrap();
        assert_eq!(gauge.filled_epochs, 0);
        assert_eq!(gauge.remaining().unwrap(), coins("100stake"));

        lock_some(&lockup, &mut txn, "alice", "10stake");
        assert_eq!(k.distribute_epoch(&mut txn, NOW, 2).unwrap(), coins("50stake"));
        assert_eq!(k.distribute_epoch(&mut txn, NOW, 3).unwrap(), coins("50stake"));
        assert_eq!(k.gauge_status(&txn, id).unwrap(), GaugeStatus::Finished);
    }

    #[test]
    fn perpetual_gauge_pays_whatever_it_holds() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, lockup, funder) = setup(&mut txn);
        lock_some(&lockup, &mut txn, "alice", "10stake");
        let id = k
            .create_gauge(&mut txn, true, &funder, coins("40stake"), QueryCondition::by_duration("stake", DAY), NOW, 0)
            .unwrap();

        assert_eq!(k.distribute_epoch(&mut txn, NOW, 1).unwrap(), coins("40stake"));
        assert!(k.distribute_epoch(&mut txn, NOW, 2).unwrap().is_empty());
        k.add_to_gauge_rewards(&mut txn, &funder, coins("5stake"), id).unwrap();
        assert_eq!(k.distribute_epoch(&mut txn, NOW, 3).unwrap(), coins("5stake"));

        let gauge = k.get_gauge_by_id(&txn, id).unwrap();
        assert_eq!(gauge.filled_epochs, 0);
        assert_eq!(k.gauge_status(&txn, id).unwrap(), GaugeStatus::Active);
        let cur = k.get_current_reward(&txn, "stake", DAY).unwrap();
        assert_eq!(cur.pending.iter().map(|p| p.epoch).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn tiny_finite_gauge_still_counts_epochs() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, lockup, funder) = setup(&mut txn);
        lock_some(&lockup, &mut txn, "alice", "10stake");
        let id = k
            .create_gauge(&mut txn, false, &funder, coins("2stake"), QueryCondition::by_duration("stake", DAY), NOW, 3)
            .unwrap();

        assert!(k.distribute_epoch(&mut txn, NOW, 1).unwrap().is_empty());
        assert_eq!(k.distribute_epoch(&mut txn, NOW, 2).unwrap(), coins("1stake"));
        assert_eq!(k.distribute_epoch(&mut txn, NOW, 3).unwrap(), coins("1stake"));
        assert_eq!(k.gauge_status(&txn, id).unwrap(), GaugeStatus::Finished);
        assert_eq!(k.get_gauge_by_id(&txn, id).unwrap().distributed_coins, coins("2stake"));
    }

    #[test]
    fn upcoming_gauge_waits_for_start_time() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let (k, lockup, funder) = setup(&mut txn);
        lock_some(&lockup, &mut txn, "alice", "10stake");
        let id = k
            .create_gauge(&mut txn, false, &funder, coins("10stake"), QueryCondition::by_duration("stake", DAY), NOW + DAY, 1)
            .unwrap();

        assert!(k.distribute_epoch(&mut txn, NOW, 1).unwrap().is_empty());
        assert_eq!(k.gauge_status(&txn, id).unwrap(), GaugeStatus::Upcoming);
        assert_eq!(k.distribute_epoch(&mut txn, NOW + DAY, 2).unwrap(), coins("10stake"));
        assert_eq!(k.gauge_status(&txn, id).unwrap(), GaugeStatus::Finished);
        assert_eq!(pending(&k, &txn), coins("10stake"));
    }
}
