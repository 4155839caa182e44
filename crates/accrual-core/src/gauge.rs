use serde::{Deserialize, Serialize};

use crate::coins::Coins;
use crate::error::AccrualError;
use crate::lock::QueryCondition;
use crate::types::{GaugeId, Timestamp};

/// Lifecycle stage of a gauge. Stored as an index so each stage can be
/// listed without scanning every gauge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GaugeStatus {
    Upcoming,
    Active,
    Finished,
}

impl GaugeStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            GaugeStatus::Upcoming => 0,
            GaugeStatus::Active => 1,
            GaugeStatus::Finished => 2,
        }
    }
}

/// A reward source paying into one bucket each distribution epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gauge {
    pub id: GaugeId,
    /// Perpetual gauges pay out whatever they hold every epoch and never finish.
    pub is_perpetual: bool,
    pub distribute_to: QueryCondition,
    /// Total coins ever funded into the gauge.
    pub coins: Coins,
    pub start_time: Timestamp,
    pub num_epochs_paid_over: u64,
    pub filled_epochs: u64,
    pub distributed_coins: Coins,
}

impl Gauge {
    /// Coins funded but not yet paid out.
    pub fn remaining(&self) -> Result<Coins, AccrualError> {
        self.coins.checked_sub(&self.distributed_coins).ok_or_else(|| {
            AccrualError::Invariant(format!(
                "gauge {} distributed {} out of {}",
                self.id, self.distributed_coins, self.coins
            ))
        })
    }

    pub fn is_filled(&self) -> bool {
        !self.is_perpetual && self.filled_epochs >= self.num_epochs_paid_over
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge(coins: &str, distributed: &str) -> Gauge {
        Gauge {
            id: 7,
            is_perpetual: false,
            distribute_to: QueryCondition::by_duration("stake", 86_400),
            coins: coins.parse().unwrap(),
            start_time: 0,
            num_epochs_paid_over: 2,
            filled_epochs: 1,
            distributed_coins: distributed.parse().unwrap(),
        }
    }

    #[test]
    fn remaining_is_funded_minus_distributed() {
        assert_eq!(gauge("100stake", "40stake").remaining().unwrap(), "60stake".parse::<Coins>().unwrap());
        assert!(gauge("100stake", "100stake").remaining().unwrap().is_empty());
    }

    #[test]
    fn overdistributed_gauge_is_an_invariant_violation() {
        let err = gauge("100stake", "101stake").remaining().unwrap_err();
        assert!(matches!(err, AccrualError::Invariant(_)));
        assert!(err.is_fatal());
    }
}
