use std::fmt;
use std::path::Path;
use std::str::FromStr;

use accrual_core::coins::Coins;
use accrual_core::error::AccrualError;
use accrual_core::params::Params;
use accrual_core::types::{AccountId, DurationSecs, Timestamp};
use serde::{Deserialize, Serialize};

/// An account named either by its base-58 id or by a label it is derived from.
///
/// On the command line `id:<base58>` selects an id and anything else is a label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRef {
    Id(String),
    Label(String),
}

impl AccountRef {
    pub fn resolve(&self) -> Result<AccountId, AccrualError> {
        match self {
            AccountRef::Id(b58) => AccountId::from_b58(b58),
            AccountRef::Label(label) if label.is_empty() => {
                Err(AccrualError::InvalidGenesis("empty account label".into()))
            }
            AccountRef::Label(label) => Ok(AccountId::from_label(label)),
        }
    }
}

impl FromStr for AccountRef {
    type Err = AccrualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let account = match s.strip_prefix("id:") {
            Some(b58) => AccountRef::Id(b58.to_string()),
            None => AccountRef::Label(s.to_string()),
        };
        account.resolve()?;
        Ok(account)
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Id(b58) => write!(f, "id:{b58}"),
            AccountRef::Label(label) => write!(f, "{label}"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisEpoch {
    pub identifier: String,
    pub start_time: Timestamp,
    pub duration: DurationSecs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub account: AccountRef,
    pub coins: Coins,
}

/// A lock created at genesis time from its owner's balance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisLock {
    pub owner: AccountRef,
    pub coins: Coins,
    pub duration: DurationSecs,
    /// Start unlocking immediately after creation.
    #[serde(default)]
    pub unlocking: bool,
}

/// A gauge funded at genesis time from its owner's balance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisGauge {
    pub owner: AccountRef,
    #[serde(default)]
    pub is_perpetual: bool,
    pub coins: Coins,
    pub denom: String,
    pub duration: DurationSecs,
    pub start_time: Timestamp,
    #[serde(default)]
    pub num_epochs_paid_over: u64,
}

/// Initial chain state, read from a JSON document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenesisParams {
    /// Block time at which genesis locks and gauges are created.
    #[serde(default)]
    pub genesis_time: Timestamp,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub lockable_durations: Vec<DurationSecs>,
    #[serde(default)]
    pub epochs: Vec<GenesisEpoch>,
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
    #[serde(default)]
    pub locks: Vec<GenesisLock>,
    #[serde(default)]
    pub gauges: Vec<GenesisGauge>,
}

impl GenesisParams {
    pub fn from_json(json: &str) -> Result<Self, AccrualError> {
        serde_json::from_str(json).map_err(|e| AccrualError::InvalidGenesis(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AccrualError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AccrualError::InvalidGenesis(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}
