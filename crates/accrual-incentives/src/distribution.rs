//! Lazy reward accounting.
//!
//! Each bucket `(denom, duration)` keeps one open [`CurrentReward`]. Gauge
//! payouts are queued on it and the bucket is marked dirty; the queued
//! payouts are folded into immutable [`HistoricalReward`] ratios the next
//! time anything touches the bucket. A lock's owed reward over any span of
//! periods is then `amount * (ratio[end] - ratio[start])`, so an epoch costs
//! one write per bucket instead of one per lock.

use accrual_core::coins::{Coins, DecCoins};
use accrual_core::error::AccrualError;
use accrual_core::lock::{BucketKey, PeriodLock};
use accrual_core::reward::{CurrentReward, EpochPayout, HistoricalReward, PeriodLockReward};
use accrual_core::types::{AccountId, Balance, DurationSecs, LockId};
use accrual_core::Decimal;
use accrual_lockup::LockEvent;
use accrual_state::{bank, Txn};
use tracing::{debug, info, warn};

use crate::keeper::IncentivesKeeper;

/// Direction of a lock event relative to the reward pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockChange {
    Entered,
    Left,
}

// ── Pure helpers ─────────────────────────────────────────────────────────────

/// Cumulative ratio of `bucket` at the start of `period`.
fn cumulative_before(txn: &Txn<'_>, bucket: &BucketKey, period: u64) -> Result<DecCoins, AccrualError> {
    if period == 0 {
        return Ok(DecCoins::empty());
    }
    txn.get_historical_reward(&bucket.denom, bucket.duration, period - 1)?
        .map(|h| h.cumulative_reward_ratio)
        .ok_or_else(|| {
            AccrualError::Invariant(format!("{bucket} is missing historical period {}", period - 1))
        })
}

/// Reward earned by `amount` locked while the cumulative ratio moved from
/// `start` to `end`.
fn accrued(end: &DecCoins, start: &DecCoins, amount: Balance) -> Result<DecCoins, AccrualError> {
    let diff = end.checked_sub(start)?;
    if diff.is_any_negative() {
        return Err(AccrualError::Invariant(format!(
            "cumulative ratio went backwards: {start} -> {end}"
        )));
    }
    diff.checked_mul_int(amount)
}

/// Close every pending payout of `current` into a new period.
///
/// Returns the closed bucket state and the historical records to write;
/// nothing is read beyond the last stored ratio and nothing is written.
fn fold_pending(
    txn: &Txn<'_>,
    bucket: &BucketKey,
    current: &CurrentReward,
) -> Result<(CurrentReward, Vec<HistoricalReward>), AccrualError> {
    let mut next = current.clone();
    let mut closed = Vec::with_capacity(current.pending.len());
    let mut cumulative = cumulative_before(txn, bucket, current.period)?;

    for EpochPayout { epoch, coins } in &current.pending {
        let ratio = if current.coin.amount == 0 {
            warn!(bucket = %bucket, epoch, payout = %coins, "closing period with nothing locked");
            DecCoins::empty()
        } else {
            DecCoins::from_coins(coins).checked_quo_dec(&Decimal::from_u128(current.coin.amount))?
        };
        cumulative = cumulative.checked_add(&ratio)?;
        closed.push(HistoricalReward {
            cumulative_reward_ratio: cumulative.clone(),
            period: next.period,
            epoch: *epoch,
        });
        next.period = next
            .period
            .checked_add(1)
            .ok_or_else(|| AccrualError::Overflow(format!("period counter of {bucket}")))?;
        next.last_processed_epoch = *epoch;
    }

    next.pending.clear();
    next.is_new_epoch = false;
    Ok((next, closed))
}

impl IncentivesKeeper {
    // ── Period closing ───────────────────────────────────────────────────────

    /// Close the pending periods of `bucket` if it is dirty and return its
    /// (possibly fresh) accumulator.
    pub fn calculate_historical_rewards(
        &self,
        txn: &mut Txn<'_>,
        bucket: &BucketKey,
    ) -> Result<CurrentReward, AccrualError> {
        let current = txn
            .get_current_reward(&bucket.denom, bucket.duration)?
            .unwrap_or_else(|| CurrentReward::new(bucket.denom.clone()));
        if !current.is_new_epoch {
            return Ok(current);
        }

        let (next, closed) = fold_pending(txn, bucket, &current)?;
        for record in &closed {
            txn.insert_historical_reward(&bucket.denom, bucket.duration, record)?;
        }
        txn.put_current_reward(bucket.duration, &next)?;
        info!(
            bucket = %bucket,
            periods = closed.len(),
            period = next.period,
            locked = next.coin.amount,
            "periods closed"
        );
        Ok(next)
    }

    /// Close every dirty bucket a lock of `coins` for `lock_duration` belongs to.
    pub fn update_historical_reward_from_current_reward(
        &self,
        txn: &mut Txn<'_>,
        coins: &Coins,
        lock_duration: DurationSecs,
    ) -> Result<(), AccrualError> {
        let durations = self.eligible_durations(txn, lock_duration)?;
        for coin in coins {
            for &duration in &durations {
                self.calculate_historical_rewards(txn, &BucketKey::new(coin.denom.clone(), duration))?;
            }
        }
        Ok(())
    }

    /// Queue `coins` on `bucket` as the payout for `epoch`.
    pub(crate) fn credit_bucket(
        &self,
        txn: &mut Txn<'_>,
        bucket: &BucketKey,
        epoch: i64,
        coins: &Coins,
    ) -> Result<(), AccrualError> {
        let mut current = txn
            .get_current_reward(&bucket.denom, bucket.duration)?
            .unwrap_or_else(|| CurrentReward::new(bucket.denom.clone()));
        match current.pending.last_mut() {
            Some(last) if last.epoch == epoch => last.coins = last.coins.checked_add(coins)?,
            _ => current.pending.push(EpochPayout { epoch, coins: coins.clone() }),
        }
        current.is_new_epoch = true;
        txn.put_current_reward(bucket.duration, &current)?;
        debug!(bucket = %bucket, epoch, coins = %coins, "payout queued");
        Ok(())
    }

    // ── Syncing ──────────────────────────────────────────────────────────────

    /// Bring `reward` up to the bucket's current period, crediting what
    /// `amount` earned since the lock last synced.
    fn sync_bucket(
        &self,
        txn: &Txn<'_>,
        reward: &mut PeriodLockReward,
        bucket: &BucketKey,
        current: &CurrentReward,
        amount: Balance,
    ) -> Result<(), AccrualError> {
        let synced = reward.synced_period(bucket).unwrap_or(0);
        if synced > current.period {
            return Err(AccrualError::Invariant(format!(
                "lock {} synced at period {synced} ahead of {bucket} period {}",
                reward.id, current.period
            )));
        }
        if synced < current.period && amount > 0 {
            let earned = accrued(
                &cumulative_before(txn, bucket, current.period)?,
                &cumulative_before(txn, bucket, synced)?,
                amount,
            )?;
            reward.rewards = reward.rewards.checked_add(&earned)?;
        }
        reward.set_synced_period(bucket, current.period);
        Ok(())
    }

    /// Settle a lock against every bucket it belongs to at its current
    /// amount. Unlocking locks are no longer in any bucket and are left as is.
    pub fn update_reward_for_lock(
        &self,
        txn: &mut Txn<'_>,
        lock: &PeriodLock,
    ) -> Result<PeriodLockReward, AccrualError> {
        let mut reward = txn.get_lock_reward(lock.id)?.unwrap_or_else(|| PeriodLockReward::new(lock.id));
        if lock.is_unlocking() {
            return Ok(reward);
        }
        let durations = self.eligible_durations(txn, lock.duration)?;
        for coin in &lock.coins {
            for &duration in &durations {
                let bucket = BucketKey::new(coin.denom.clone(), duration);
                let current = self.calculate_historical_rewards(txn, &bucket)?;
                self.sync_bucket(txn, &mut reward, &bucket, &current, coin.amount)?;
            }
        }
        txn.put_lock_reward(&reward)?;
        Ok(reward)
    }

    /// Apply a lock event to the buckets it touches: close their pending
    /// periods, settle the lock at its amount before the change, then move
    /// the bucket totals. A lock that has left the pool entirely is paid
    /// what it is owed and forgotten.
    pub fn on_lock_change(
        &self,
        txn: &mut Txn<'_>,
        event: &LockEvent<'_>,
        change: LockChange,
    ) -> Result<(), AccrualError> {
        let in_pool = txn.get_lock(event.lock_id)?.filter(|l| !l.is_unlocking());
        let durations = self.eligible_durations(txn, event.duration)?;
        let mut reward = txn
            .get_lock_reward(event.lock_id)?
            .unwrap_or_else(|| PeriodLockReward::new(event.lock_id));

        for coin in event.coins {
            let post = in_pool.as_ref().map_or(0, |l| l.coins.amount_of(&coin.denom));
            let pre = match change {
                LockChange::Entered => post.checked_sub(coin.amount).ok_or_else(|| {
                    AccrualError::Invariant(format!(
                        "lock {} holds {post}{} after adding {coin}",
                        event.lock_id, coin.denom
                    ))
                })?,
                LockChange::Left => post
                    .checked_add(coin.amount)
                    .ok_or_else(|| AccrualError::Overflow(format!("lock {} amount", event.lock_id)))?,
            };

            for &duration in &durations {
                let bucket = BucketKey::new(coin.denom.clone(), duration);
                let mut current = self.calculate_historical_rewards(txn, &bucket)?;
                self.sync_bucket(txn, &mut reward, &bucket, &current, pre)?;
                current.coin.amount = match change {
                    LockChange::Entered => current
                        .coin
                        .amount
                        .checked_add(coin.amount)
                        .ok_or_else(|| AccrualError::Overflow(format!("locked total of {bucket}")))?,
                    LockChange::Left => current.coin.amount.checked_sub(coin.amount).ok_or_else(|| {
                        AccrualError::Invariant(format!(
                            "{bucket} holds {} but {coin} left it",
                            current.coin.amount
                        ))
                    })?,
                };
                txn.put_current_reward(duration, &current)?;
            }
        }

        if change == LockChange::Left && in_pool.is_none() {
            self.pay_out(txn, &mut reward, event.owner)?;
            txn.delete_lock_reward(event.lock_id);
        } else {
            txn.put_lock_reward(&reward)?;
        }
        Ok(())
    }

    /// Send the whole-coin part of the owed reward to `recipient`. The
    /// fractional change stays on the record and counts toward later claims.
    fn pay_out(
        &self,
        txn: &mut Txn<'_>,
        reward: &mut PeriodLockReward,
        recipient: &AccountId,
    ) -> Result<Coins, AccrualError> {
        if reward.rewards.is_any_negative() {
            return Err(AccrualError::Invariant(format!(
                "lock {} owes negative reward {}",
                reward.id, reward.rewards
            )));
        }
        let (paid, dust) = reward.rewards.truncate()?;
        if !paid.is_empty() {
            bank::send_coins(txn, &bank::incentives_module_account(), recipient, &paid).map_err(|e| {
                AccrualError::Invariant(format!("incentives module cannot pay lock {}: {e}", reward.id))
            })?;
        }
        reward.rewards = dust.clone();
        info!(lock_id = reward.id, recipient = %recipient, paid = %paid, dust = %dust, "reward paid");
        Ok(paid)
    }

    // ── Claim / estimate ─────────────────────────────────────────────────────

    /// Settle lock `lock_id` and send its reward to `recipient`. Only the
    /// owner may claim. An unlocking lock was already paid when it left the
    /// pool, so it claims nothing.
    pub fn claim_lock_reward(
        &self,
        txn: &mut Txn<'_>,
        caller: &AccountId,
        lock_id: LockId,
        recipient: &AccountId,
    ) -> Result<Coins, AccrualError> {
        let lock = self.lockup.get_lock_by_id(txn, lock_id)?;
        if &lock.owner != caller {
            return Err(AccrualError::NotLockOwner { lock_id, caller: caller.to_string() });
        }
        if lock.is_unlocking() {
            return Ok(Coins::empty());
        }
        let mut reward = self.update_reward_for_lock(txn, &lock)?;
        let paid = self.pay_out(txn, &mut reward, recipient)?;
        txn.put_lock_reward(&reward)?;
        Ok(paid)
    }

    /// What `lock` would hold if every dirty bucket closed now. Reads only.
    pub fn estimate_lock_reward(&self, txn: &Txn<'_>, lock: &PeriodLock) -> Result<DecCoins, AccrualError> {
        let reward = txn.get_lock_reward(lock.id)?.unwrap_or_else(|| PeriodLockReward::new(lock.id));
        let mut owed = reward.rewards.clone();
        if lock.is_unlocking() {
            return Ok(owed);
        }

        for coin in &lock.coins {
            for duration in self.eligible_durations(txn, lock.duration)? {
                let bucket = BucketKey::new(coin.denom.clone(), duration);
                let Some(current) = txn.get_current_reward(&bucket.denom, duration)? else {
                    continue;
                };
                let end = if current.is_new_epoch {
                    let (_, closed) = fold_pending(txn, &bucket, &current)?;
                    match closed.last() {
                        Some(last) => last.cumulative_reward_ratio.clone(),
                        None => cumulative_before(txn, &bucket, current.period)?,
                    }
                } else {
                    cumulative_before(txn, &bucket, current.period)?
                };
                let synced = reward.synced_period(&bucket).unwrap_or(0);
                let start = cumulative_before(txn, &bucket, synced)?;
                owed = owed.checked_add(&accrued(&end, &start, coin.amount)?)?;
            }
        }
        Ok(owed)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get_period_lock_reward(&self, txn: &Txn<'_>, lock_id: LockId) -> Result<PeriodLockReward, AccrualError> {
        txn.get_lock_reward(lock_id)?.ok_or(AccrualError::PeriodLockRewardNotFound(lock_id))
    }

    pub fn get_current_reward(
        &self,
        txn: &Txn<'_>,
        denom: &str,
        duration: DurationSecs,
    ) -> Result<CurrentReward, AccrualError> {
        txn.get_current_reward(denom, duration)?.ok_or_else(|| AccrualError::CurrentRewardNotFound {
            denom: denom.to_string(),
            duration,
        })
    }

    pub fn get_historical_reward(
        &self,
        txn: &Txn<'_>,
        denom: &str,
        duration: DurationSecs,
        period: u64,
    ) -> Result<HistoricalReward, AccrualError> {
        txn.get_historical_reward(denom, duration, period)?.ok_or_else(|| {
            AccrualError::HistoricalRewardNotFound { denom: denom.to_string(), duration, period }
        })
    }
}
