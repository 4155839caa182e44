use serde::{Deserialize, Serialize};

use crate::coins::Coins;
use crate::types::{AccountId, DurationSecs, LockId, Timestamp};

// ── PeriodLock ───────────────────────────────────────────────────────────────

/// Coins held by the lockup module on behalf of `owner` for `duration`.
///
/// A lock is *locked* while `end_time` is `None`. Beginning to unlock sets
/// `end_time = now + duration`; the lock can be withdrawn once the block time
/// reaches `end_time`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodLock {
    pub id: LockId,
    pub owner: AccountId,
    pub duration: DurationSecs,
    pub end_time: Option<Timestamp>,
    pub coins: Coins,
}

impl PeriodLock {
    pub fn new(id: LockId, owner: AccountId, duration: DurationSecs, coins: Coins) -> Self {
        Self { id, owner, duration, end_time: None, coins }
    }

    pub fn is_unlocking(&self) -> bool {
        self.end_time.is_some()
    }

    /// True once the lock is unlocking and `now` has reached its end time.
    pub fn is_matured(&self, now: Timestamp) -> bool {
        self.end_time.is_some_and(|end| now >= end)
    }
}

// ── QueryCondition ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockQueryType {
    /// Locks of the denom with `duration >= condition.duration` that are not unlocking.
    ByDuration,
    /// Locks of the denom still locked past `condition.timestamp`.
    ByTime,
}

/// Selects a population of locks; gauges distribute to the locks it matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryCondition {
    pub lock_query_type: LockQueryType,
    pub denom: String,
    #[serde(default)]
    pub duration: DurationSecs,
    #[serde(default)]
    pub timestamp: Timestamp,
}

impl QueryCondition {
    pub fn by_duration(denom: impl Into<String>, duration: DurationSecs) -> Self {
        Self { lock_query_type: LockQueryType::ByDuration, denom: denom.into(), duration, timestamp: 0 }
    }

    pub fn by_time(denom: impl Into<String>, timestamp: Timestamp) -> Self {
        Self { lock_query_type: LockQueryType::ByTime, denom: denom.into(), duration: 0, timestamp }
    }

    pub fn bucket(&self) -> BucketKey {
        BucketKey::new(self.denom.clone(), self.duration)
    }
}

// ── BucketKey ────────────────────────────────────────────────────────────────

/// Address of one reward pool: every lock of `denom` with a duration at least
/// `duration` shares it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub denom: String,
    pub duration: DurationSecs,
}

impl BucketKey {
    pub fn new(denom: impl Into<String>, duration: DurationSecs) -> Self {
        Self { denom: denom.into(), duration }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}s", self.denom, self.duration)
    }
}
