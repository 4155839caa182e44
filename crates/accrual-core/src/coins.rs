use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use accrual_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_DENOM_LEN;
use crate::error::AccrualError;
use crate::types::Balance;

/// Check that `denom` is 1..=128 chars of `[a-zA-Z0-9/:._-]` starting with a letter.
pub fn validate_denom(denom: &str) -> Result<(), AccrualError> {
    let mut chars = denom.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c));
    if !starts_with_letter || !rest_ok || denom.len() > MAX_DENOM_LEN {
        return Err(AccrualError::InvalidDenom(denom.to_string()));
    }
    Ok(())
}

// ── Coin ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Balance,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Balance) -> Self {
        Self { denom: denom.into(), amount }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = AccrualError;

    /// Parses `"100stake"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| AccrualError::InvalidCoins(s.to_string()))?;
        let (amount, denom) = s.split_at(split);
        let amount = amount
            .parse::<Balance>()
            .map_err(|_| AccrualError::InvalidCoins(s.to_string()))?;
        validate_denom(denom)?;
        Ok(Coin::new(denom, amount))
    }
}

// ── Coins ────────────────────────────────────────────────────────────────────

/// A set of coins with at most one entry per denom, no zero amounts,
/// iterated in denom order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coin>", into = "Vec<Coin>")]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Validates denoms and rejects duplicates. Zero amounts are dropped.
    pub fn new(coins: Vec<Coin>) -> Result<Self, AccrualError> {
        let mut map = BTreeMap::new();
        for coin in coins {
            validate_denom(&coin.denom)?;
            if map.insert(coin.denom.clone(), coin.amount).is_some() {
                return Err(AccrualError::InvalidCoins(format!("duplicate denom {}", coin.denom)));
            }
        }
        Ok(Self::from_map(map))
    }

    pub fn from_coin(coin: Coin) -> Result<Self, AccrualError> {
        Self::new(vec![coin])
    }

    fn from_map(map: BTreeMap<String, Balance>) -> Self {
        Self(
            map.into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }

    fn to_map(&self) -> BTreeMap<String, Balance> {
        self.0.iter().map(|c| (c.denom.clone(), c.amount)).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Coin> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn denoms(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|c| c.denom.as_str())
    }

    pub fn amount_of(&self, denom: &str) -> Balance {
        self.0
            .binary_search_by(|c| c.denom.as_str().cmp(denom))
            .map(|i| self.0[i].amount)
            .unwrap_or(0)
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins, AccrualError> {
        let mut map = self.to_map();
        for coin in other.iter() {
            let entry = map.entry(coin.denom.clone()).or_insert(0);
            *entry = entry
                .checked_add(coin.amount)
                .ok_or_else(|| AccrualError::Overflow(format!("{} + {}", self, other)))?;
        }
        Ok(Self::from_map(map))
    }

    /// `None` when any denom of `other` exceeds what `self` holds.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut map = self.to_map();
        for coin in other.iter() {
            let entry = map.entry(coin.denom.clone()).or_insert(0);
            *entry = entry.checked_sub(coin.amount)?;
        }
        Some(Self::from_map(map))
    }

    /// True when `self` holds at least `other` of every denom in `other`.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other.iter().all(|c| self.amount_of(&c.denom) >= c.amount)
    }

    /// Integer division of every amount, truncating. Zero results are dropped.
    pub fn quo_int(&self, divisor: u128) -> Coins {
        if divisor == 0 {
            return Coins::empty();
        }
        Self(
            self.0
                .iter()
                .filter_map(|c| {
                    let amount = c.amount / divisor;
                    (amount > 0).then(|| Coin::new(c.denom.clone(), amount))
                })
                .collect(),
        )
    }
}

impl TryFrom<Vec<Coin>> for Coins {
    type Error = AccrualError;

    fn try_from(coins: Vec<Coin>) -> Result<Self, Self::Error> {
        Coins::new(coins)
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(coins: Coins) -> Self {
        coins.0
    }
}

impl<'a> IntoIterator for &'a Coins {
    type Item = &'a Coin;
    type IntoIter = std::slice::Iter<'a, Coin>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for Coins {
    type Err = AccrualError;

    /// Parses `"10stake,5uatom"`; the empty string is the empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Coins::empty());
        }
        let coins = s.split(',').map(Coin::from_str).collect::<Result<Vec<_>, _>>()?;
        Coins::new(coins)
    }
}

// ── DecCoin ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecCoin {
    pub denom: String,
    pub amount: Decimal,
}

impl fmt::Display for DecCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

// ── DecCoins ─────────────────────────────────────────────────────────────────

/// Decimal analogue of [`Coins`]: sorted by denom, zero-free.
///
/// Reward ratios and owed rewards are carried as `DecCoins` so that
/// fractional remainders survive between periods.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecCoins(Vec<DecCoin>);

impl DecCoins {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_coins(coins: &Coins) -> Self {
        Self(
            coins
                .iter()
                .map(|c| DecCoin { denom: c.denom.clone(), amount: Decimal::from_u128(c.amount) })
                .collect(),
        )
    }

    fn from_map(map: BTreeMap<String, Decimal>) -> Self {
        Self(
            map.into_iter()
                .filter(|(_, amount)| !amount.is_zero())
                .map(|(denom, amount)| DecCoin { denom, amount })
                .collect(),
        )
    }

    fn to_map(&self) -> BTreeMap<String, Decimal> {
        self.0.iter().map(|c| (c.denom.clone(), c.amount.clone())).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DecCoin> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn amount_of(&self, denom: &str) -> Decimal {
        self.0
            .binary_search_by(|c| c.denom.as_str().cmp(denom))
            .map(|i| self.0[i].amount.clone())
            .unwrap_or_else(|_| Decimal::zero())
    }

    pub fn is_any_negative(&self) -> bool {
        self.0.iter().any(|c| c.amount.is_negative())
    }

    pub fn checked_add(&self, other: &DecCoins) -> Result<DecCoins, AccrualError> {
        let mut map = self.to_map();
        for coin in other.iter() {
            let entry = map.entry(coin.denom.clone()).or_insert_with(Decimal::zero);
            entry.add_mut(&coin.amount)?;
        }
        Ok(Self::from_map(map))
    }

    /// Difference per denom; the result may hold negative amounts, which
    /// callers treat as an invariant violation.
    pub fn checked_sub(&self, other: &DecCoins) -> Result<DecCoins, AccrualError> {
        let mut map = self.to_map();
        for coin in other.iter() {
            let entry = map.entry(coin.denom.clone()).or_insert_with(Decimal::zero);
            entry.sub_mut(&coin.amount)?;
        }
        Ok(Self::from_map(map))
    }

    /// Multiply every amount by a whole number (exact).
    pub fn checked_mul_int(&self, i: u128) -> Result<DecCoins, AccrualError> {
        let coins = self
            .0
            .iter()
            .map(|c| Ok(DecCoin { denom: c.denom.clone(), amount: c.amount.checked_mul_int(i)? }))
            .collect::<Result<Vec<_>, AccrualError>>()?;
        Ok(Self(coins.into_iter().filter(|c| !c.amount.is_zero()).collect()))
    }

    /// Divide every amount by `d`, rounding half-to-even.
    pub fn checked_quo_dec(&self, d: &Decimal) -> Result<DecCoins, AccrualError> {
        let coins = self
            .0
            .iter()
            .map(|c| Ok(DecCoin { denom: c.denom.clone(), amount: c.amount.checked_quo(d)? }))
            .collect::<Result<Vec<_>, AccrualError>>()?;
        Ok(Self(coins.into_iter().filter(|c| !c.amount.is_zero()).collect()))
    }

    /// Split into the integral coins and the fractional change left behind.
    pub fn truncate(&self) -> Result<(Coins, DecCoins), AccrualError> {
        let mut whole = BTreeMap::new();
        let mut change = BTreeMap::new();
        for coin in self.0.iter() {
            whole.insert(coin.denom.clone(), coin.amount.truncate_u128()?);
            change.insert(coin.denom.clone(), coin.amount.fract());
        }
        Ok((Coins::from_map(whole), Self::from_map(change)))
    }
}

impl fmt::Display for DecCoins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}
