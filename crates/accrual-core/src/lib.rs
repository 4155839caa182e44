pub mod coins;
pub mod constants;
pub mod error;
pub mod gauge;
pub mod lock;
pub mod params;
pub mod reward;
pub mod types;

pub use accrual_decimal::{Decimal, DecimalError};
pub use coins::*;
pub use constants::*;
pub use error::AccrualError;
pub use gauge::*;
pub use lock::*;
pub use params::*;
pub use reward::*;
pub use types::*;
