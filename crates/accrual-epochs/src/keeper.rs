use std::sync::Arc;

use accrual_core::error::AccrualError;
use accrual_core::types::{DurationSecs, Timestamp};
use accrual_state::db::decode;
use accrual_state::{keys, Txn};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::hooks::EpochHooks;

/// State of one named epoch clock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub identifier: String,
    pub start_time: Timestamp,
    pub duration: DurationSecs,
    #[serde(default)]
    pub current_epoch: i64,
    #[serde(default)]
    pub current_epoch_start_time: Timestamp,
    #[serde(default)]
    pub epoch_counting_started: bool,
}

impl EpochInfo {
    pub fn new(identifier: impl Into<String>, start_time: Timestamp, duration: DurationSecs) -> Self {
        Self {
            identifier: identifier.into(),
            start_time,
            duration,
            current_epoch: 0,
            current_epoch_start_time: start_time,
            epoch_counting_started: false,
        }
    }
}

#[derive(Default, Clone)]
pub struct EpochsKeeper {
    hooks: Vec<Arc<dyn EpochHooks>>,
}

impl EpochsKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: Arc<dyn EpochHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn set_epoch_info(&self, txn: &mut Txn<'_>, info: &EpochInfo) -> Result<(), AccrualError> {
        if info.identifier.is_empty() || info.duration <= 0 {
            return Err(AccrualError::InvalidGenesis(format!(
                "epoch {:?} needs an identifier and a positive duration",
                info.identifier
            )));
        }
        txn.put(keys::epoch(&info.identifier), info)
    }

    pub fn get_epoch_info(&self, txn: &Txn<'_>, identifier: &str) -> Result<EpochInfo, AccrualError> {
        txn.get(&keys::epoch(identifier))?
            .ok_or_else(|| AccrualError::EpochNotFound(identifier.to_string()))
    }

    /// Every epoch clock, in identifier order.
    pub fn all_epoch_infos(&self, txn: &Txn<'_>) -> Result<Vec<EpochInfo>, AccrualError> {
        txn.scan_prefix(&keys::epoch_prefix())?
            .into_iter()
            .map(|(_, v)| decode(&v))
            .collect()
    }

    /// Advance every clock to block time `now`.
    ///
    /// A clock starts counting at the first block with `now >= start_time`
    /// (epoch 1, only `before_epoch_start` fires). After that at most one
    /// boundary is crossed per block.
    pub fn begin_block(&self, txn: &mut Txn<'_>, now: Timestamp) -> Result<(), AccrualError> {
        for mut info in self.all_epoch_infos(txn)? {
            if !info.epoch_counting_started {
                if now < info.start_time {
                    continue;
                }
                info.epoch_counting_started = true;
                info.current_epoch = 1;
                info.current_epoch_start_time = info.start_time;
                txn.put(keys::epoch(&info.identifier), &info)?;
                info!(identifier = %info.identifier, epoch = 1, "epoch counting started");
                for hook in &self.hooks {
                    hook.before_epoch_start(txn, now, &info.identifier, info.current_epoch)?;
                }
                continue;
            }

            let epoch_end = info
                .current_epoch_start_time
                .checked_add(info.duration)
                .ok_or_else(|| AccrualError::Overflow(format!("epoch {} end", info.identifier)))?;
            if now < epoch_end {
                continue;
            }

            let ended = info.current_epoch;
            for hook in &self.hooks {
                hook.after_epoch_end(txn, now, &info.identifier, ended)?;
            }
            info.current_epoch += 1;
            info.current_epoch_start_time = epoch_end;
            txn.put(keys::epoch(&info.identifier), &info)?;
            info!(identifier = %info.identifier, ended, epoch = info.current_epoch, "epoch boundary");
            for hook in &self.hooks {
                hook.before_epoch_start(txn, now, &info.identifier, info.current_epoch)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrual_core::constants::SECS_PER_DAY;
    use std::cell::RefCell;

    use accrual_state::StateDb;

    const DAY: i64 = SECS_PER_DAY;
    const T0: Timestamp = 1_700_000_000;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(String, i64)>>,
    }

    impl EpochHooks for Recorder {
        fn after_epoch_end(&self, _: &mut Txn<'_>, _: Timestamp, id: &str, n: i64) -> Result<(), AccrualError> {
            self.calls.borrow_mut().push((format!("end:{id}"), n));
            Ok(())
        }

        fn before_epoch_start(&self, _: &mut Txn<'_>, _: Timestamp, id: &str, n: i64) -> Result<(), AccrualError> {
            self.calls.borrow_mut().push((format!("start:{id}"), n));
            Ok(())
        }
    }

    #[test]
    fn first_start_then_one_boundary_per_block() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let recorder = Arc::new(Recorder::default());
        let k = EpochsKeeper::new().with_hook(recorder.clone());
        k.set_epoch_info(&mut txn, &EpochInfo::new("day", T0, DAY)).unwrap();

        k.begin_block(&mut txn, T0 - 1).unwrap();
        assert!(recorder.calls.borrow().is_empty());

        k.begin_block(&mut txn, T0).unwrap();
        let info = k.get_epoch_info(&txn, "day").unwrap();
        assert_eq!(info.current_epoch, 1);
        assert_eq!(info.current_epoch_start_time, T0);

        k.begin_block(&mut txn, T0 + DAY - 1).unwrap();
        assert_eq!(k.get_epoch_info(&txn, "day").unwrap().current_epoch, 1);

        // three days late: still only one boundary this block
        k.begin_block(&mut txn, T0 + 3 * DAY).unwrap();
        let info = k.get_epoch_info(&txn, "day").unwrap();
        assert_eq!(info.current_epoch, 2);
        assert_eq!(info.current_epoch_start_time, T0 + DAY);

        assert_eq!(
            *recorder.calls.borrow(),
            vec![
                ("start:day".to_string(), 1),
                ("end:day".to_string(), 1),
                ("start:day".to_string(), 2),
            ]
        );
    }

    #[test]
    fn clocks_advance_independently() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        let k = EpochsKeeper::new();
        k.set_epoch_info(&mut txn, &EpochInfo::new("day", T0, DAY)).unwrap();
        k.set_epoch_info(&mut txn, &EpochInfo::new("week", T0, 7 * DAY)).unwrap();

        for i in 0..=8 {
            k.begin_block(&mut txn, T0 + i * DAY).unwrap();
        }
        assert_eq!(k.get_epoch_info(&txn, "day").unwrap().current_epoch, 9);
        assert_eq!(k.get_epoch_info(&txn, "week").unwrap().current_epoch, 2);
        assert_eq!(k.all_epoch_infos(&txn).unwrap().len(), 2);
    }

    #[test]
    fn rejects_zero_duration() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        assert!(EpochsKeeper::new()
            .set_epoch_info(&mut txn, &EpochInfo::new("bad", T0, 0))
            .is_err());
        assert!(matches!(
            EpochsKeeper::new().get_epoch_info(&txn, "missing"),
            Err(AccrualError::EpochNotFound(_))
        ));
    }
}
