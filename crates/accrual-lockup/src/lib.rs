//! accrual-lockup
//!
//! The lock ledger: custody of locked coins, lock lifecycle (lock, top up,
//! begin unlock, partial unlock, withdraw), the lock indexes and the
//! duration accumulation index, and the callbacks other modules register
//! to observe coins entering and leaving the reward pool.

pub mod hooks;
pub mod keeper;
pub mod query;

pub use hooks::{LockEvent, LockupHooks};
pub use keeper::LockupKeeper;
