//! Key layout of the `state` tree.
//!
//! ```text
//!   0x01 lock               id                        → bincode(PeriodLock)
//!   0x02 lock_by_account    owner | id                → []
//!   0x03 lock_by_duration   denom 0 | duration | id   → []   (locked only)
//!   0x04 lock_by_end        end | id                  → []   (unlocking only)
//!   0x05 lock_by_denom_end  denom 0 | end | id        → []   (unlocking only)
//!   0x06 accumulation       denom 0 | level | prefix  → u128 big-endian
//!   0x07 balance            account | denom           → u128 big-endian
//!   0x08 gauge              id                        → bincode(Gauge)
//!   0x09 gauge_by_status    status | id               → []
//!   0x0a current_reward     denom 0 | duration        → bincode(CurrentReward)
//!   0x0b historical_reward  denom 0 | duration | period → bincode(HistoricalReward)
//!   0x0c lock_reward        id                        → bincode(PeriodLockReward)
//!   0x0d epoch              identifier                → bincode(EpochInfo)
//!   0x0e meta               name                      → bincode(..)
//! ```
//!
//! Integers are big-endian so byte order matches numeric order. Timestamps
//! have their sign bit flipped for the same reason. Denoms never contain a
//! zero byte, so `denom 0` is an unambiguous terminator.

use accrual_core::gauge::GaugeStatus;
use accrual_core::types::{AccountId, DurationSecs, GaugeId, LockId, Timestamp};

pub const LOCK: u8 = 0x01;
pub const LOCK_BY_ACCOUNT: u8 = 0x02;
pub const LOCK_BY_DURATION: u8 = 0x03;
pub const LOCK_BY_END: u8 = 0x04;
pub const LOCK_BY_DENOM_END: u8 = 0x05;
pub const ACCUMULATION: u8 = 0x06;
pub const BALANCE: u8 = 0x07;
pub const GAUGE: u8 = 0x08;
pub const GAUGE_BY_STATUS: u8 = 0x09;
pub const CURRENT_REWARD: u8 = 0x0a;
pub const HISTORICAL_REWARD: u8 = 0x0b;
pub const LOCK_REWARD: u8 = 0x0c;
pub const EPOCH: u8 = 0x0d;
pub const META: u8 = 0x0e;

// ── Encoding ─────────────────────────────────────────────────────────────────

pub fn encode_time(t: Timestamp) -> [u8; 8] {
    ((t as u64) ^ (1 << 63)).to_be_bytes()
}

pub fn decode_time(b: &[u8]) -> Option<Timestamp> {
    let arr: [u8; 8] = b.try_into().ok()?;
    Some((u64::from_be_bytes(arr) ^ (1 << 63)) as i64)
}

/// Durations are validated non-negative before they reach a key.
pub fn encode_duration(d: DurationSecs) -> [u8; 8] {
    (d.max(0) as u64).to_be_bytes()
}

fn with_denom(table: u8, denom: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(2 + denom.len() + 24);
    k.push(table);
    k.extend_from_slice(denom.as_bytes());
    k.push(0);
    k
}

/// Trailing lock id of an index key.
pub fn trailing_id(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(8)?;
    let arr: [u8; 8] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

// ── Locks ────────────────────────────────────────────────────────────────────

pub fn lock(id: LockId) -> Vec<u8> {
    let mut k = vec![LOCK];
    k.extend_from_slice(&id.to_be_bytes());
    k
}

pub fn lock_by_account_prefix(owner: &AccountId) -> Vec<u8> {
    let mut k = vec![LOCK_BY_ACCOUNT];
    k.extend_from_slice(owner.as_bytes());
    k
}

pub fn lock_by_account(owner: &AccountId, id: LockId) -> Vec<u8> {
    let mut k = lock_by_account_prefix(owner);
    k.extend_from_slice(&id.to_be_bytes());
    k
}

pub fn lock_by_duration_prefix(denom: &str) -> Vec<u8> {
    with_denom(LOCK_BY_DURATION, denom)
}

/// First key of the duration index at or above `duration`.
pub fn lock_by_duration_from(denom: &str, duration: DurationSecs) -> Vec<u8> {
    let mut k = lock_by_duration_prefix(denom);
    k.extend_from_slice(&encode_duration(duration));
    k
}

pub fn lock_by_duration(denom: &str, duration: DurationSecs, id: LockId) -> Vec<u8> {
    let mut k = lock_by_duration_from(denom, duration);
    k.extend_from_slice(&id.to_be_bytes());
    k
}

pub fn lock_by_end_prefix() -> Vec<u8> {
    vec![LOCK_BY_END]
}

/// First key of the end-time index at or above `end`.
pub fn lock_by_end_from(end: Timestamp) -> Vec<u8> {
    let mut k = lock_by_end_prefix();
    k.extend_from_slice(&encode_time(end));
    k
}

pub fn lock_by_end(end: Timestamp, id: LockId) -> Vec<u8> {
    let mut k = lock_by_end_from(end);
    k.extend_from_slice(&id.to_be_bytes());
    k
}

pub fn lock_by_denom_end_prefix(denom: &str) -> Vec<u8> {
    with_denom(LOCK_BY_DENOM_END, denom)
}

pub fn lock_by_denom_end_from(denom: &str, end: Timestamp) -> Vec<u8> {
    let mut k = lock_by_denom_end_prefix(denom);
    k.extend_from_slice(&encode_time(end));
    k
}

pub fn lock_by_denom_end(denom: &str, end: Timestamp, id: LockId) -> Vec<u8> {
    let mut k = lock_by_denom_end_from(denom, end);
    k.extend_from_slice(&id.to_be_bytes());
    k
}

pub fn accumulation_node(denom: &str, level: u8, prefix: u64) -> Vec<u8> {
    let mut k = with_denom(ACCUMULATION, denom);
    k.push(level);
    k.extend_from_slice(&prefix.to_be_bytes());
    k
}

// ── Bank ─────────────────────────────────────────────────────────────────────

pub fn balance_prefix(account: &AccountId) -> Vec<u8> {
    let mut k = vec![BALANCE];
    k.extend_from_slice(account.as_bytes());
    k
}

pub fn balance(account: &AccountId, denom: &str) -> Vec<u8> {
    let mut k = balance_prefix(account);
    k.extend_from_slice(denom.as_bytes());
    k
}

// ── Gauges ───────────────────────────────────────────────────────────────────

pub fn gauge(id: GaugeId) -> Vec<u8> {
    let mut k = vec![GAUGE];
    k.extend_from_slice(&id.to_be_bytes());
    k
}

pub fn gauge_by_status_prefix(status: GaugeStatus) -> Vec<u8> {
    vec![GAUGE_BY_STATUS, status.as_byte()]
}

pub fn gauge_by_status(status: GaugeStatus, id: GaugeId) -> Vec<u8> {
    let mut k = gauge_by_status_prefix(status);
    k.extend_from_slice(&id.to_be_bytes());
    k
}

// ── Rewards ──────────────────────────────────────────────────────────────────

pub fn current_reward(denom: &str, duration: DurationSecs) -> Vec<u8> {
    let mut k = with_denom(CURRENT_REWARD, denom);
    k.extend_from_slice(&encode_duration(duration));
    k
}

pub fn historical_reward(denom: &str, duration: DurationSecs, period: u64) -> Vec<u8> {
    let mut k = with_denom(HISTORICAL_REWARD, denom);
    k.extend_from_slice(&encode_duration(duration));
    k.extend_from_slice(&period.to_be_bytes());
    k
}

pub fn lock_reward(id: LockId) -> Vec<u8> {
    let mut k = vec![LOCK_REWARD];
    k.extend_from_slice(&id.to_be_bytes());
    k
}

// ── Epochs / meta ────────────────────────────────────────────────────────────

pub fn epoch_prefix() -> Vec<u8> {
    vec![EPOCH]
}

pub fn epoch(identifier: &str) -> Vec<u8> {
    let mut k = epoch_prefix();
    k.extend_from_slice(identifier.as_bytes());
    k
}

pub fn meta(name: &str) -> Vec<u8> {
    let mut k = vec![META];
    k.extend_from_slice(name.as_bytes());
    k
}
