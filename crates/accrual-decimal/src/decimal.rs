use std::cmp::Ordering;
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecimalError;

/// Number of fractional decimal digits carried by every [`Decimal`].
pub const PRECISION_DIGITS: u32 = 18;

/// Bits needed to hold 10^18.
pub const DECIMAL_PRECISION_BITS: u64 = 60;

/// Largest bit length a scaled value may reach before it is an overflow.
pub const MAX_BIT_LEN: u64 = 255 + DECIMAL_PRECISION_BITS;

/// Precomputed scaling values derived from [`PRECISION_DIGITS`].
struct Scale {
    /// 10^18, the scaled representation of 1.
    one: BigInt,
    /// 10^18 / 2, the rounding midpoint for chopped digits.
    half: BigInt,
}

static SCALE: Lazy<Scale> = Lazy::new(|| {
    let one = BigInt::from(10u32).pow(PRECISION_DIGITS);
    let half = &one / BigInt::from(2u32);
    Scale { one, half }
});

/// Signed fixed-point decimal with 18 fractional digits.
///
/// A `Decimal` is a value: every operation returns a new value and leaves its
/// operands untouched. The `*_mut` methods are the explicit in-place variants
/// for hot loops that own their accumulator.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Decimal(BigInt);

impl Decimal {
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    pub fn one() -> Self {
        Self(SCALE.one.clone())
    }

    /// Whole-number decimal from an unsigned amount.
    pub fn from_u128(i: u128) -> Self {
        Self(BigInt::from(i) * &SCALE.one)
    }

    /// Whole-number decimal from a signed integer.
    pub fn from_i64(i: i64) -> Self {
        Self(BigInt::from(i) * &SCALE.one)
    }

    /// Build from the integer-scaled representation (`atomics / 10^18`).
    pub fn from_atomics(atomics: BigInt) -> Result<Self, DecimalError> {
        checked(atomics)
    }

    /// The integer-scaled representation (`self * 10^18`).
    pub fn to_atomics(&self) -> &BigInt {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(&self, other: &Decimal) -> Result<Self, DecimalError> {
        checked(&self.0 + &other.0)
    }

    pub fn checked_sub(&self, other: &Decimal) -> Result<Self, DecimalError> {
        checked(&self.0 - &other.0)
    }

    /// Product rounded half-to-even at the 18th fractional digit.
    pub fn checked_mul(&self, other: &Decimal) -> Result<Self, DecimalError> {
        checked(chop_precision_and_round(&self.0 * &other.0))
    }

    /// Quotient rounded half-to-even at the 18th fractional digit.
    pub fn checked_quo(&self, other: &Decimal) -> Result<Self, DecimalError> {
        if other.is_zero() {
            return Err(DecimalError::DivisionByZero);
        }
        // Scale twice so the truncated quotient keeps 36 fractional digits,
        // then chop back down to 18 with rounding.
        let widened = &self.0 * &SCALE.one * &SCALE.one;
        checked(chop_precision_and_round(widened / &other.0))
    }

    /// Multiply by a whole number; exact, no rounding involved.
    pub fn checked_mul_int(&self, i: u128) -> Result<Self, DecimalError> {
        checked(&self.0 * BigInt::from(i))
    }

    /// Divide by a whole number, truncating toward zero.
    pub fn checked_quo_int(&self, i: u128) -> Result<Self, DecimalError> {
        if i == 0 {
            return Err(DecimalError::DivisionByZero);
        }
        checked(&self.0 / BigInt::from(i))
    }

    pub fn add_mut(&mut self, other: &Decimal) -> Result<(), DecimalError> {
        self.0 += &other.0;
        check_bits(&self.0)
    }

    pub fn sub_mut(&mut self, other: &Decimal) -> Result<(), DecimalError> {
        self.0 -= &other.0;
        check_bits(&self.0)
    }

    pub fn mul_mut(&mut self, other: &Decimal) -> Result<(), DecimalError> {
        *self = self.checked_mul(other)?;
        Ok(())
    }

    pub fn quo_mut(&mut self, other: &Decimal) -> Result<(), DecimalError> {
        *self = self.checked_quo(other)?;
        Ok(())
    }

    /// Integer part, truncated toward zero.
    pub fn truncate_int(&self) -> BigInt {
        &self.0 / &SCALE.one
    }

    /// Integer part rounded half-to-even.
    pub fn round_int(&self) -> BigInt {
        chop_precision_and_round(self.0.clone())
    }

    /// Truncated integer part as an unsigned amount.
    pub fn truncate_u128(&self) -> Result<u128, DecimalError> {
        if self.is_negative() {
            return Err(DecimalError::Negative(self.to_string()));
        }
        self.truncate_int()
            .to_u128()
            .ok_or(DecimalError::Overflow { max_bits: 128 })
    }

    /// Fractional part, carrying the sign of `self`.
    pub fn fract(&self) -> Self {
        Self(&self.0 % &SCALE.one)
    }
}

fn check_bits(i: &BigInt) -> Result<(), DecimalError> {
    if i.bits() > MAX_BIT_LEN {
        return Err(DecimalError::Overflow { max_bits: MAX_BIT_LEN });
    }
    Ok(())
}

fn checked(i: BigInt) -> Result<Decimal, DecimalError> {
    check_bits(&i)?;
    Ok(Decimal(i))
}

// Remove PRECISION_DIGITS rightmost digits and round the removed part
// half-to-even (gaussian rounding).
fn chop_precision_and_round(d: BigInt) -> BigInt {
    if d.is_negative() {
        return -chop_precision_and_round(-d);
    }

    let quo = &d / &SCALE.one;
    let rem = &d % &SCALE.one;
    if rem.is_zero() {
        return quo;
    }

    match rem.cmp(&SCALE.half) {
        Ordering::Less => quo,
        Ordering::Greater => quo + BigInt::one(),
        Ordering::Equal => {
            if (&quo % BigInt::from(2u32)).is_zero() {
                quo
            } else {
                quo + BigInt::one()
            }
        }
    }
}

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl Neg for &Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-&self.0)
    }
}

impl From<u128> for Decimal {
    fn from(i: u128) -> Self {
        Decimal::from_u128(i)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.abs();
        let int = &abs / &SCALE.one;
        let frac = &abs % &SCALE.one;
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{}.{:0>width$}",
            sign,
            int,
            frac.to_string(),
            width = PRECISION_DIGITS as usize
        )
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({})", self)
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DecimalError::Parse(s.to_string());
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty()
            || frac_part.len() > PRECISION_DIGITS as usize
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(bad());
        }

        let padded = format!("{int_part}{frac_part:0<width$}", width = PRECISION_DIGITS as usize);
        let mut atomics: BigInt = padded.parse().map_err(|_| bad())?;
        if negative {
            atomics = -atomics;
        }
        checked(atomics)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
