use std::sync::Arc;

use accrual_core::coins::Coins;
use accrual_core::error::AccrualError;
use accrual_core::lock::PeriodLock;
use accrual_core::types::{AccountId, DurationSecs, LockId, Timestamp};
use accrual_state::tables::META_NEXT_LOCK_ID;
use accrual_state::db::prefix_end;
use accrual_state::{accumulation, bank, keys, Txn};
use tracing::{debug, info};

use crate::hooks::{LockEvent, LockupHooks};

/// Lock ledger. Stateless apart from its registered hooks; every operation
/// works on the caller's transaction at block time `now`.
#[derive(Default, Clone)]
pub struct LockupKeeper {
    hooks: Vec<Arc<dyn LockupHooks>>,
}

impl LockupKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Hooks run in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn LockupHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    fn fire_locked(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        event: &LockEvent<'_>,
    ) -> Result<(), AccrualError> {
        for hook in &self.hooks {
            hook.on_token_locked(txn, now, event)?;
        }
        Ok(())
    }

    fn fire_unlocked(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        event: &LockEvent<'_>,
    ) -> Result<(), AccrualError> {
        for hook in &self.hooks {
            hook.on_token_unlocked(txn, now, event)?;
        }
        Ok(())
    }

    // ── Locking ──────────────────────────────────────────────────────────────

    /// Lock coins under an explicit identifier.
    pub fn lock(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        lock: PeriodLock,
    ) -> Result<PeriodLock, AccrualError> {
        validate_new_lock(&lock)?;
        if txn.get_lock(lock.id)?.is_some() {
            return Err(AccrualError::DuplicateLock(lock.id));
        }

        bank::send_coins(txn, &lock.owner, &bank::lockup_module_account(), &lock.coins)?;
        txn.put_lock(&lock)?;
        txn.put_raw(keys::lock_by_account(&lock.owner, lock.id), Vec::new());
        for coin in &lock.coins {
            txn.put_raw(keys::lock_by_duration(&coin.denom, lock.duration, lock.id), Vec::new());
            accumulation::increase(txn, &coin.denom, lock.duration, coin.amount)?;
        }
        txn.bump_id_past(META_NEXT_LOCK_ID, lock.id)?;

        info!(
            lock_id = lock.id,
            owner = %lock.owner,
            coins = %lock.coins,
            duration = lock.duration,
            "lock created"
        );

        self.fire_locked(
            txn,
            now,
            &LockEvent {
                owner: &lock.owner,
                lock_id: lock.id,
                coins: &lock.coins,
                duration: lock.duration,
                unlock_time: None,
            },
        )?;
        Ok(lock)
    }

    /// Lock coins under the next free identifier.
    pub fn create_lock(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        owner: &AccountId,
        coins: Coins,
        duration: DurationSecs,
    ) -> Result<PeriodLock, AccrualError> {
        let id = txn.next_id(META_NEXT_LOCK_ID)?;
        self.lock(txn, now, PeriodLock::new(id, owner.clone(), duration, coins))
    }

    /// Top up the owner's existing lock of the same duration and single denom
    /// if there is one, otherwise create a new lock.
    pub fn lock_tokens(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        owner: &AccountId,
        coins: Coins,
        duration: DurationSecs,
    ) -> Result<PeriodLock, AccrualError> {
        if coins.len() == 1 {
            let denom = coins.denoms().next().unwrap_or_default().to_string();
            let existing = self
                .get_account_period_locks(txn, owner)?
                .into_iter()
                .find(|l| !l.is_unlocking() && l.duration == duration && l.coins.amount_of(&denom) > 0);
            if let Some(existing) = existing {
                return self.add_tokens_to_lock_by_id(txn, now, owner, existing.id, coins);
            }
        }
        self.create_lock(txn, now, owner, coins, duration)
    }

    pub fn add_tokens_to_lock_by_id(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        owner: &AccountId,
        lock_id: LockId,
        coins: Coins,
    ) -> Result<PeriodLock, AccrualError> {
        if coins.is_empty() {
            return Err(AccrualError::InvalidCoins("no coins to add".into()));
        }
        let mut lock = self.get_lock_by_id(txn, lock_id)?;
        if &lock.owner != owner {
            return Err(AccrualError::NotLockOwner { lock_id, caller: owner.to_string() });
        }
        if lock.is_unlocking() {
            return Err(AccrualError::LockAlreadyUnlocking(lock_id));
        }

        bank::send_coins(txn, owner, &bank::lockup_module_account(), &coins)?;
        lock.coins = lock.coins.checked_add(&coins)?;
        txn.put_lock(&lock)?;
        for coin in &coins {
            txn.put_raw(keys::lock_by_duration(&coin.denom, lock.duration, lock.id), Vec::new());
            accumulation::increase(txn, &coin.denom, lock.duration, coin.amount)?;
        }

        info!(lock_id, added = %coins, total = %lock.coins, "lock topped up");

        self.fire_locked(
            txn,
            now,
            &LockEvent {
                owner: &lock.owner,
                lock_id,
                coins: &coins,
                duration: lock.duration,
                unlock_time: None,
            },
        )?;
        Ok(lock)
    }

    // ── Unlocking ────────────────────────────────────────────────────────────

    pub fn begin_unlock(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        lock_id: LockId,
    ) -> Result<PeriodLock, AccrualError> {
        let lock = self.get_lock_by_id(txn, lock_id)?;
        self.begin_unlock_lock(txn, now, lock)
    }

    /// Start the unlocking countdown: the lock leaves the reward pool and
    /// becomes withdrawable at `now + duration`.
    pub fn begin_unlock_lock(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        mut lock: PeriodLock,
    ) -> Result<PeriodLock, AccrualError> {
        if lock.is_unlocking() {
            return Err(AccrualError::LockAlreadyUnlocking(lock.id));
        }
        let end = unlock_end(now, lock.duration)?;

        for coin in &lock.coins {
            txn.delete(keys::lock_by_duration(&coin.denom, lock.duration, lock.id));
            accumulation::decrease(txn, &coin.denom, lock.duration, coin.amount)?;
        }
        lock.end_time = Some(end);
        txn.put_lock(&lock)?;
        index_unlocking(txn, &lock, end);

        info!(lock_id = lock.id, end_time = end, coins = %lock.coins, "lock unlocking");

        self.fire_unlocked(
            txn,
            now,
            &LockEvent {
                owner: &lock.owner,
                lock_id: lock.id,
                coins: &lock.coins,
                duration: lock.duration,
                unlock_time: Some(end),
            },
        )?;
        Ok(lock)
    }

    /// Unlock `coins` out of a lock.
    ///
    /// Returns `(remaining, unlocking)`. Unlocking everything behaves like
    /// [`begin_unlock`](Self::begin_unlock) and yields `(None, lock)`.
    /// Otherwise the unlocking part moves to a new lock and the original
    /// keeps the remainder.
    pub fn begin_partial_unlock(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        lock_id: LockId,
        coins: &Coins,
    ) -> Result<(Option<PeriodLock>, PeriodLock), AccrualError> {
        let mut lock = self.get_lock_by_id(txn, lock_id)?;
        if lock.is_unlocking() {
            return Err(AccrualError::LockAlreadyUnlocking(lock_id));
        }
        if coins.is_empty() || !lock.coins.is_all_gte(coins) {
            return Err(AccrualError::InvalidUnlockAmount(format!(
                "cannot unlock {} from lock {} holding {}",
                coins, lock_id, lock.coins
            )));
        }
        if coins == &lock.coins {
            let unlocking = self.begin_unlock_lock(txn, now, lock)?;
            return Ok((None, unlocking));
        }

        let end = unlock_end(now, lock.duration)?;
        let remaining = lock.coins.checked_sub(coins).ok_or_else(|| {
            AccrualError::Invariant(format!("lock {lock_id} cannot cover {coins}"))
        })?;
        for coin in coins {
            if remaining.amount_of(&coin.denom) == 0 {
                txn.delete(keys::lock_by_duration(&coin.denom, lock.duration, lock.id));
            }
            accumulation::decrease(txn, &coin.denom, lock.duration, coin.amount)?;
        }
        lock.coins = remaining;
        txn.put_lock(&lock)?;

        let split_id = txn.next_id(META_NEXT_LOCK_ID)?;
        let split = PeriodLock {
            id: split_id,
            owner: lock.owner.clone(),
            duration: lock.duration,
            end_time: Some(end),
            coins: coins.clone(),
        };
        txn.put_lock(&split)?;
        txn.put_raw(keys::lock_by_account(&split.owner, split.id), Vec::new());
        index_unlocking(txn, &split, end);

        info!(
            lock_id,
            split_id,
            unlocking = %coins,
            remaining = %lock.coins,
            end_time = end,
            "lock partially unlocking"
        );

        self.fire_unlocked(
            txn,
            now,
            &LockEvent {
                owner: &lock.owner,
                lock_id,
                coins,
                duration: lock.duration,
                unlock_time: Some(end),
            },
        )?;
        Ok((Some(lock), split))
    }

    /// Begin unlocking every lock of `owner` that is not unlocking yet.
    /// Returns the affected locks by `(end_time, id)` and the sum of their coins.
    pub fn begin_unlock_all_not_unlockings(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        owner: &AccountId,
    ) -> Result<(Vec<PeriodLock>, Coins), AccrualError> {
        let mut unlocked = Vec::new();
        let mut total = Coins::empty();
        for lock in self.get_account_period_locks(txn, owner)? {
            if lock.is_unlocking() {
                continue;
            }
            total = total.checked_add(&lock.coins)?;
            unlocked.push(self.begin_unlock_lock(txn, now, lock)?);
        }
        unlocked.sort_by_key(|l| (l.end_time, l.id));
        Ok((unlocked, total))
    }

    // ── Withdrawal ───────────────────────────────────────────────────────────

    pub fn unlock(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        lock_id: LockId,
    ) -> Result<PeriodLock, AccrualError> {
        let lock = self.get_lock_by_id(txn, lock_id)?;
        self.unlock_lock(txn, now, lock)
    }

    /// Return a matured lock's coins to its owner and forget the lock.
    pub fn unlock_lock(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        lock: PeriodLock,
    ) -> Result<PeriodLock, AccrualError> {
        let end = lock.end_time.ok_or(AccrualError::LockNotUnlocking(lock.id))?;
        if now < end {
            return Err(AccrualError::LockNotMatured { lock_id: lock.id, end_time: end });
        }

        bank::send_coins(txn, &bank::lockup_module_account(), &lock.owner, &lock.coins)?;
        txn.delete_lock(lock.id);
        txn.delete(keys::lock_by_account(&lock.owner, lock.id));
        txn.delete(keys::lock_by_end(end, lock.id));
        for coin in &lock.coins {
            txn.delete(keys::lock_by_denom_end(&coin.denom, end, lock.id));
        }

        info!(lock_id = lock.id, owner = %lock.owner, coins = %lock.coins, "lock withdrawn");
        Ok(lock)
    }

    /// Withdraw every lock whose end time is at or before `now`, in end-time
    /// order. Running it twice at the same time withdraws nothing the second time.
    pub fn withdraw_all_matured_locks(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
    ) -> Result<Vec<PeriodLock>, AccrualError> {
        let end = now
            .checked_add(1)
            .map(keys::lock_by_end_from)
            .or_else(|| prefix_end(&keys::lock_by_end_prefix()));
        let matured = txn.range(keys::lock_by_end_prefix(), end)?;

        let mut withdrawn = Vec::with_capacity(matured.len());
        for (key, _) in matured {
            let id = keys::trailing_id(&key)
                .ok_or_else(|| AccrualError::Serialization("end-time index key".into()))?;
            let lock = self.get_lock_by_id(txn, id)?;
            withdrawn.push(self.unlock_lock(txn, now, lock)?);
        }
        if !withdrawn.is_empty() {
            debug!(count = withdrawn.len(), now, "matured locks withdrawn");
        }
        Ok(withdrawn)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn validate_new_lock(lock: &PeriodLock) -> Result<(), AccrualError> {
    if lock.duration < 0 {
        return Err(AccrualError::InvalidDuration(lock.duration));
    }
    if lock.coins.is_empty() {
        return Err(AccrualError::InvalidCoins("lock holds no coins".into()));
    }
    if lock.is_unlocking() {
        return Err(AccrualError::LockAlreadyUnlocking(lock.id));
    }
    Ok(())
}

fn unlock_end(now: Timestamp, duration: DurationSecs) -> Result<Timestamp, AccrualError> {
    now.checked_add(duration)
        .ok_or_else(|| AccrualError::Overflow(format!("unlock end {now} + {duration}")))
}

fn index_unlocking(txn: &mut Txn<'_>, lock: &PeriodLock, end: Timestamp) {
    txn.put_raw(keys::lock_by_end(end, lock.id), Vec::new());
    for coin in &lock.coins {
        txn.put_raw(keys::lock_by_denom_end(&coin.denom, end, lock.id), Vec::new());
    }
}
