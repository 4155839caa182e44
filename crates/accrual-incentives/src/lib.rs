//! accrual-incentives
//!
//! Gauges and the lazy (F1) reward distribution. Gauge payouts are credited
//! to per-bucket accumulators; a bucket's period is closed into an immutable
//! cumulative ratio only when something touches the bucket, and each lock
//! settles against those ratios when its amount changes or it claims.

pub mod distribution;
pub mod gauge;
pub mod hooks;
pub mod keeper;

pub use hooks::{DistributionEpochHook, LockRewardHook};
pub use keeper::IncentivesKeeper;
