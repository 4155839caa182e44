//! accrual-genesis
//!
//! Writes the initial state into an empty `StateDb` in one transaction:
//! incentives params, lockable durations, epoch clocks, account balances,
//! then genesis locks and gauges created through the regular keepers so that
//! every index and reward bucket starts out consistent.

pub mod params;

pub use params::{AccountRef, GenesisBalance, GenesisEpoch, GenesisGauge, GenesisLock, GenesisParams};

use std::collections::BTreeMap;
use std::sync::Arc;

use accrual_core::coins::Coins;
use accrual_core::error::AccrualError;
use accrual_core::lock::QueryCondition;
use accrual_core::types::{AccountId, GaugeId, LockId};
use accrual_epochs::{EpochInfo, EpochsKeeper};
use accrual_incentives::{IncentivesKeeper, LockRewardHook};
use accrual_lockup::LockupKeeper;
use accrual_state::{bank, StateDb};
use tracing::info;

/// What genesis created, in creation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenesisSummary {
    pub lock_ids: Vec<LockId>,
    pub gauge_ids: Vec<GaugeId>,
}

/// Apply `genesis` to an empty database.
///
/// Fails with [`AccrualError::AlreadyInitialised`] if anything was ever
/// committed; on any other error nothing is written.
pub fn apply_genesis(db: &StateDb, genesis: &GenesisParams) -> Result<GenesisSummary, AccrualError> {
    if !db.is_empty() {
        return Err(AccrualError::AlreadyInitialised);
    }
    info!(genesis_time = genesis.genesis_time, "applying accrual genesis state");

    let incentives = IncentivesKeeper::new();
    let lockup = LockupKeeper::new().with_hook(Arc::new(LockRewardHook::new(incentives.clone())));
    let epochs = EpochsKeeper::new();
    let now = genesis.genesis_time;
    let mut txn = db.begin();
    let mut summary = GenesisSummary::default();

    // ── 1. Params and lockable durations ─────────────────────────────────────
    incentives.set_params(&mut txn, &genesis.params)?;
    incentives.set_lockable_durations(&mut txn, genesis.lockable_durations.clone())?;

    // ── 2. Epoch clocks ──────────────────────────────────────────────────────
    for epoch in &genesis.epochs {
        if epochs.get_epoch_info(&txn, &epoch.identifier).is_ok() {
            return Err(AccrualError::InvalidGenesis(format!("duplicate epoch {:?}", epoch.identifier)));
        }
        epochs.set_epoch_info(&mut txn, &EpochInfo::new(&epoch.identifier, epoch.start_time, epoch.duration))?;
    }
    if !genesis.epochs.iter().any(|e| e.identifier == genesis.params.distr_epoch_identifier) {
        return Err(AccrualError::InvalidGenesis(format!(
            "no epoch named {:?} to drive distribution",
            genesis.params.distr_epoch_identifier
        )));
    }

    // ── 3. Balances ──────────────────────────────────────────────────────────
    let mut balances: BTreeMap<AccountId, Coins> = BTreeMap::new();
    for entry in &genesis.balances {
        let account = entry.account.resolve()?;
        let total = balances.remove(&account).unwrap_or_default().checked_add(&entry.coins)?;
        balances.insert(account, total);
    }
    for (account, coins) in &balances {
        bank::set_balances(&mut txn, account, coins);
    }
    info!(accounts = balances.len(), "genesis: balances written");

    // ── 4. Locks ─────────────────────────────────────────────────────────────
    for entry in &genesis.locks {
        let owner = entry.owner.resolve()?;
        let lock = lockup.create_lock(&mut txn, now, &owner, entry.coins.clone(), entry.duration)?;
        if entry.unlocking {
            lockup.begin_unlock(&mut txn, now, lock.id)?;
        }
        summary.lock_ids.push(lock.id);
    }
    info!(locks = summary.lock_ids.len(), "genesis: locks created");

    // ── 5. Gauges ────────────────────────────────────────────────────────────
    for entry in &genesis.gauges {
        let owner = entry.owner.resolve()?;
        let id = incentives.create_gauge(
            &mut txn,
            entry.is_perpetual,
            &owner,
            entry.coins.clone(),
            QueryCondition::by_duration(entry.denom.clone(), entry.duration),
            entry.start_time,
            entry.num_epochs_paid_over,
        )?;
        summary.gauge_ids.push(id);
    }
    info!(gauges = summary.gauge_ids.len(), "genesis: gauges created");

    txn.commit()?;
    db.flush()?;
    info!("genesis state committed to disk");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = r#"{
        "genesis_time": 1700000000,
        "params": { "distr_epoch_identifier": "day" },
        "lockable_durations": [86400, 604800],
        "epochs": [{ "identifier": "day", "start_time": 1700000000, "duration": 86400 }],
        "balances": [
            { "account": { "label": "alice" }, "coins": [{ "denom": "stake", "amount": 100 }] },
            { "account": { "label": "alice" }, "coins": [{ "denom": "stake", "amount": 50 }] },
            { "account": { "label": "funder" }, "coins": [{ "denom": "stake", "amount": 1000 }] }
        ],
        "locks": [
            { "owner": { "label": "alice" }, "coins": [{ "denom": "stake", "amount": 100 }], "duration": 604800 },
            { "owner": { "label": "alice" }, "coins": [{ "denom": "stake", "amount": 20 }], "duration": 86400, "unlocking": true }
        ],
        "gauges": [
            { "owner": { "label": "funder" }, "coins": [{ "denom": "stake", "amount": 700 }],
              "denom": "stake", "duration": 86400, "start_time": 1700000000, "num_epochs_paid_over": 7 }
        ]
    }"#;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn temp_db(name: &str) -> StateDb {
        let dir = std::env::temp_dir().join(format!("accrual_genesis_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        StateDb::open(&dir).expect("open temp db")
    }

    // ── Apply ─────────────────────────────────────────────────────────────────

    #[test]
    fn genesis_builds_consistent_state() {
        let db = temp_db("consistent");
        let genesis = GenesisParams::from_json(GENESIS).unwrap();
        let summary = apply_genesis(&db, &genesis).unwrap();
        assert_eq!(summary.lock_ids, vec![1, 2]);
        assert_eq!(summary.gauge_ids, vec![1]);

        let txn = db.begin();
        let alice = AccountId::from_label("alice");
        assert_eq!(bank::get_balance(&txn, &alice, "stake").unwrap(), 30);

        let incentives = IncentivesKeeper::new();
        assert_eq!(incentives.get_lockable_durations(&txn).unwrap(), vec![86_400, 604_800]);
        assert_eq!(incentives.get_current_reward(&txn, "stake", 86_400).unwrap().coin.amount, 100);
        assert_eq!(incentives.get_current_reward(&txn, "stake", 604_800).unwrap().coin.amount, 100);
        assert_eq!(incentives.get_upcoming_gauges(&txn).unwrap().len(), 1);
        assert_eq!(
            bank::get_balance(&txn, &bank::incentives_module_account(), "stake").unwrap(),
            700
        );
        assert!(LockupKeeper::new().get_lock_by_id(&txn, 2).unwrap().is_unlocking());
        assert_eq!(EpochsKeeper::new().get_epoch_info(&txn, "day").unwrap().current_epoch, 0);
    }

    #[test]
    fn genesis_applies_only_once() {
        let db = temp_db("once");
        let genesis = GenesisParams::from_json(GENESIS).unwrap();
        apply_genesis(&db, &genesis).unwrap();
        assert!(matches!(apply_genesis(&db, &genesis), Err(AccrualError::AlreadyInitialised)));
    }

    #[test]
    fn failed_genesis_writes_nothing() {
        let db = temp_db("rollback");
        let mut genesis = GenesisParams::from_json(GENESIS).unwrap();
        genesis.locks[0].coins = "1000000stake".parse().unwrap();
        assert!(matches!(
            apply_genesis(&db, &genesis),
            Err(AccrualError::InsufficientBalance { .. })
        ));
        assert!(db.is_empty());
    }

    #[test]
    fn genesis_needs_distribution_epoch() {
        let db = temp_db("no_epoch");
        let mut genesis = GenesisParams::from_json(GENESIS).unwrap();
        genesis.epochs.clear();
        assert!(matches!(apply_genesis(&db, &genesis), Err(AccrualError::InvalidGenesis(_))));
    }

    #[test]
    fn account_refs_parse() {
        let alice: AccountRef = "alice".parse().unwrap();
        assert_eq!(alice.resolve().unwrap(), AccountId::from_label("alice"));
        let id = AccountId::from_label("bob");
        let by_id: AccountRef = format!("id:{id}").parse().unwrap();
        assert_eq!(by_id.resolve().unwrap(), id);
        assert!("id:not-base58!".parse::<AccountRef>().is_err());
        assert!(GenesisParams::from_json("{ not json").is_err());
    }
}
