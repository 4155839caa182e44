//! accrual-epochs
//!
//! Epoch clock: named, fixed-length epochs advanced by block time, with
//! callbacks fired at each boundary.

pub mod hooks;
pub mod keeper;

pub use hooks::EpochHooks;
pub use keeper::{EpochInfo, EpochsKeeper};
