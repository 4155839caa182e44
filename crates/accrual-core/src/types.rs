use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AccrualError;

/// Integral coin amount in the smallest unit of its denomination.
pub type Balance = u128;

/// Unix timestamp (seconds, UTC). Always the block time, never the wall clock.
pub type Timestamp = i64;

/// Non-negative length of time in seconds.
pub type DurationSecs = i64;

pub type LockId = u64;

pub type GaugeId = u64;

// ── AccountId ────────────────────────────────────────────────────────────────

/// 32-byte account identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Deterministic identifier derived as BLAKE3 of a human-readable label.
    /// Module accounts and genesis accounts are named this way.
    pub fn from_label(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    /// Base-58 encoded string representation.
    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_b58(s: &str) -> Result<Self, AccrualError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| AccrualError::InvalidAccount(format!("{s:?}: {e}")))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AccrualError::InvalidAccount(format!("{s:?}: expected 32 bytes")))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b58 = self.to_b58();
        write!(f, "AccountId({})", &b58[..b58.len().min(8)])
    }
}

impl FromStr for AccountId {
    type Err = AccrualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_b58(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_ids_are_stable_and_distinct() {
        let a = AccountId::from_label("module/lockup");
        let b = AccountId::from_label("module/incentives");
        assert_eq!(a, AccountId::from_label("module/lockup"));
        assert_ne!(a, b);
    }

    #[test]
    fn b58_round_trip() {
        let id = AccountId::from_label("alice");
        assert_eq!(id.to_b58().parse::<AccountId>().unwrap(), id);
        let err = "short".parse::<AccountId>().unwrap_err();
        assert!(matches!(err, AccrualError::InvalidAccount(_)));
        assert!(!err.is_fatal());
        assert!(matches!("0OIl".parse::<AccountId>(), Err(AccrualError::InvalidAccount(_))));
    }
}
