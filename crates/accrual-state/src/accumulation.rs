//! Per-denom binary sum tree over the 64-bit duration key space.
//!
//! Level `l` (0..=64) holds one node per distinct top-`l`-bit prefix of the
//! duration; level 64 nodes are single durations. Each node stores the total
//! locked amount under it, so adding a lock touches 65 nodes and the sum over
//! all durations `>= d` needs at most 65 reads, whatever the number of locks.

use accrual_core::error::AccrualError;
use accrual_core::types::{Balance, DurationSecs};

use crate::db::Txn;
use crate::keys;

const LEVELS: u8 = 64;

fn node_prefix(duration: u64, level: u8) -> u64 {
    if level == 0 {
        0
    } else {
        duration >> (LEVELS - level)
    }
}

fn read_node(txn: &Txn<'_>, denom: &str, level: u8, prefix: u64) -> Result<Balance, AccrualError> {
    match txn.get_raw(&keys::accumulation_node(denom, level, prefix))? {
        Some(bytes) => {
            let arr: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                AccrualError::Serialization(format!("accumulation node {denom}/{level}/{prefix}"))
            })?;
            Ok(u128::from_be_bytes(arr))
        }
        None => Ok(0),
    }
}

fn write_node(txn: &mut Txn<'_>, denom: &str, level: u8, prefix: u64, value: Balance) {
    let key = keys::accumulation_node(denom, level, prefix);
    if value == 0 {
        txn.delete(key);
    } else {
        txn.put_raw(key, value.to_be_bytes().to_vec());
    }
}

fn duration_key(duration: DurationSecs) -> Result<u64, AccrualError> {
    u64::try_from(duration).map_err(|_| AccrualError::InvalidDuration(duration))
}

/// Add `amount` of `denom` locked for `duration`.
pub fn increase(
    txn: &mut Txn<'_>,
    denom: &str,
    duration: DurationSecs,
    amount: Balance,
) -> Result<(), AccrualError> {
    if amount == 0 {
        return Ok(());
    }
    let d = duration_key(duration)?;
    for level in 0..=LEVELS {
        let prefix = node_prefix(d, level);
        let value = read_node(txn, denom, level, prefix)?
            .checked_add(amount)
            .ok_or_else(|| AccrualError::Overflow(format!("accumulation {denom}")))?;
        write_node(txn, denom, level, prefix, value);
    }
    Ok(())
}

/// Remove `amount` of `denom` locked for `duration`. Going below zero means
/// the index and the lock records disagree, which is fatal.
pub fn decrease(
    txn: &mut Txn<'_>,
    denom: &str,
    duration: DurationSecs,
    amount: Balance,
) -> Result<(), AccrualError> {
    if amount == 0 {
        return Ok(());
    }
    let d = duration_key(duration)?;
    for level in 0..=LEVELS {
        let prefix = node_prefix(d, level);
        let value = read_node(txn, denom, level, prefix)?.checked_sub(amount).ok_or_else(|| {
            AccrualError::Invariant(format!(
                "accumulation underflow: {denom} duration {duration} level {level}"
            ))
        })?;
        write_node(txn, denom, level, prefix, value);
    }
    Ok(())
}

/// Total amount of `denom` locked for a duration of at least `duration`.
pub fn sum_at_least(txn: &Txn<'_>, denom: &str, duration: DurationSecs) -> Result<Balance, AccrualError> {
    let x = duration_key(duration.max(0))?;
    let mut total: Balance = 0;
    for level in 0..LEVELS {
        let shift = LEVELS - 1 - level;
        if (x >> shift) & 1 == 0 {
            // Right sibling of x's path at level+1: every key under it is > x.
            let sibling = (x >> shift) | 1;
            total = checked_total(total, read_node(txn, denom, level + 1, sibling)?, denom)?;
        }
    }
    checked_total(total, read_node(txn, denom, LEVELS, x)?, denom)
}

fn checked_total(a: Balance, b: Balance, denom: &str) -> Result<Balance, AccrualError> {
    a.checked_add(b)
        .ok_or_else(|| AccrualError::Overflow(format!("accumulation query {denom}")))
}
