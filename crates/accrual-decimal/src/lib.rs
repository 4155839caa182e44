//! accrual-decimal
//!
//! Deterministic fixed-point decimal arithmetic. Every ratio in the reward
//! engine (reward per locked unit, payout splits) goes through this type.
//!
//! Values are signed integers scaled by 10^18. Multiplication and division
//! are computed at doubled precision and the excess digits are chopped with
//! banker's rounding (round half to even), so repeated per-epoch ratio
//! updates carry no directional bias. Magnitudes above the fixed bit bound
//! are reported as [`DecimalError::Overflow`]; nothing wraps or saturates.

pub mod decimal;
pub mod error;

pub use decimal::{Decimal, DECIMAL_PRECISION_BITS, MAX_BIT_LEN, PRECISION_DIGITS};
pub use error::DecimalError;
