//! Minimal bank: per-account, per-denom balances stored alongside the rest
//! of the state so that transfers commit with the event that caused them.

use accrual_core::coins::{Coin, Coins};
use accrual_core::constants::{INCENTIVES_MODULE_LABEL, LOCKUP_MODULE_LABEL};
use accrual_core::error::AccrualError;
use accrual_core::types::{AccountId, Balance};

use crate::db::Txn;
use crate::keys;

/// Account custodying locked coins.
pub fn lockup_module_account() -> AccountId {
    AccountId::from_label(LOCKUP_MODULE_LABEL)
}

/// Account custodying gauge funds.
pub fn incentives_module_account() -> AccountId {
    AccountId::from_label(INCENTIVES_MODULE_LABEL)
}

fn decode_amount(bytes: &[u8]) -> Result<Balance, AccrualError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| AccrualError::Serialization("balance value".into()))?;
    Ok(u128::from_be_bytes(arr))
}

pub fn get_balance(txn: &Txn<'_>, account: &AccountId, denom: &str) -> Result<Balance, AccrualError> {
    match txn.get_raw(&keys::balance(account, denom))? {
        Some(bytes) => decode_amount(&bytes),
        None => Ok(0),
    }
}

fn put_balance(txn: &mut Txn<'_>, account: &AccountId, denom: &str, amount: Balance) {
    let key = keys::balance(account, denom);
    if amount == 0 {
        txn.delete(key);
    } else {
        txn.put_raw(key, amount.to_be_bytes().to_vec());
    }
}

pub fn get_all_balances(txn: &Txn<'_>, account: &AccountId) -> Result<Coins, AccrualError> {
    let prefix = keys::balance_prefix(account);
    let mut coins = Vec::new();
    for (k, v) in txn.scan_prefix(&prefix)? {
        let denom = String::from_utf8(k[prefix.len()..].to_vec())
            .map_err(|e| AccrualError::Serialization(e.to_string()))?;
        coins.push(Coin::new(denom, decode_amount(&v)?));
    }
    Coins::new(coins)
}

/// Overwrite the balance of every denom in `coins`. Used by genesis and tests.
pub fn set_balances(txn: &mut Txn<'_>, account: &AccountId, coins: &Coins) {
    for coin in coins {
        put_balance(txn, account, &coin.denom, coin.amount);
    }
}

/// Move `coins` from `from` to `to`; nothing moves if any denom is short.
pub fn send_coins(
    txn: &mut Txn<'_>,
    from: &AccountId,
    to: &AccountId,
    coins: &Coins,
) -> Result<(), AccrualError> {
    for coin in coins {
        let have = get_balance(txn, from, &coin.denom)?;
        if have < coin.amount {
            return Err(AccrualError::InsufficientBalance {
                denom: coin.denom.clone(),
                need: coin.amount,
                have,
            });
        }
    }
    for coin in coins {
        let from_balance = get_balance(txn, from, &coin.denom)? - coin.amount;
        put_balance(txn, from, &coin.denom, from_balance);
        let to_balance = get_balance(txn, to, &coin.denom)?
            .checked_add(coin.amount)
            .ok_or_else(|| AccrualError::Overflow(format!("balance of {to} in {}", coin.denom)))?;
        put_balance(txn, to, &coin.denom, to_balance);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StateDb;

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    #[test]
    fn send_moves_every_denom() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let alice = AccountId::from_label("alice");
        let bob = AccountId::from_label("bob");
        set_balances(&mut txn, &alice, &coins("100stake,5foo"));

        send_coins(&mut txn, &alice, &bob, &coins("40stake,5foo")).unwrap();
        assert_eq!(get_all_balances(&txn, &alice).unwrap(), coins("60stake"));
        assert_eq!(get_all_balances(&txn, &bob).unwrap(), coins("40stake,5foo"));
    }

    #[test]
    fn short_balance_moves_nothing() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let alice = AccountId::from_label("alice");
        let bob = AccountId::from_label("bob");
        set_balances(&mut txn, &alice, &coins("100stake,1foo"));

        let err = send_coins(&mut txn, &alice, &bob, &coins("50stake,2foo")).unwrap_err();
        assert!(matches!(err, AccrualError::InsufficientBalance { need: 2, have: 1, .. }));
        assert_eq!(get_balance(&txn, &alice, "stake").unwrap(), 100);
        assert_eq!(get_balance(&txn, &bob, "stake").unwrap(), 0);
    }
}
