use accrual_decimal::DecimalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccrualError {
    // ── Input errors ─────────────────────────────────────────────────────────
    #[error("invalid denomination: {0:?}")]
    InvalidDenom(String),

    #[error("invalid coins: {0}")]
    InvalidCoins(String),

    #[error("invalid account id: {0}")]
    InvalidAccount(String),

    #[error("invalid duration: {0} seconds")]
    InvalidDuration(i64),

    #[error("insufficient balance: need {need}{denom}, have {have}{denom}")]
    InsufficientBalance { denom: String, need: u128, have: u128 },

    // ── Lock errors ──────────────────────────────────────────────────────────
    #[error("lock not found: {0}")]
    LockNotFound(u64),

    #[error("lock {lock_id} is not owned by {caller}")]
    NotLockOwner { lock_id: u64, caller: String },

    #[error("lock {0} is already unlocking")]
    LockAlreadyUnlocking(u64),

    #[error("lock {0} is not unlocking")]
    LockNotUnlocking(u64),

    #[error("lock {lock_id} not yet matured (unlocks at {end_time})")]
    LockNotMatured { lock_id: u64, end_time: i64 },

    #[error("lock already exists: {0}")]
    DuplicateLock(u64),

    #[error("invalid unlock amount: {0}")]
    InvalidUnlockAmount(String),

    // ── Reward errors ────────────────────────────────────────────────────────
    #[error("period lock reward not found for lock {0}")]
    PeriodLockRewardNotFound(u64),

    #[error("current reward not found for {denom}/{duration}s")]
    CurrentRewardNotFound { denom: String, duration: i64 },

    #[error("historical reward not found for {denom}/{duration}s period {period}")]
    HistoricalRewardNotFound { denom: String, duration: i64, period: u64 },

    // ── Gauge errors ─────────────────────────────────────────────────────────
    #[error("gauge not found: {0}")]
    GaugeNotFound(u64),

    #[error("gauge {gauge_id} has not started (starts at {start_time})")]
    GaugeNotStarted { gauge_id: u64, start_time: i64 },

    #[error("gauge {0} is already active")]
    GaugeAlreadyActive(u64),

    #[error("gauge {0} is already finished")]
    GaugeAlreadyFinished(u64),

    #[error("gauge {0} is not active")]
    GaugeNotActive(u64),

    #[error("gauge {gauge_id} cannot finish: {filled}/{num_epochs} epochs filled")]
    GaugeNotFilled { gauge_id: u64, filled: u64, num_epochs: u64 },

    #[error("invalid gauge: {0}")]
    InvalidGauge(String),

    #[error("duration {0}s is not a lockable duration")]
    DurationNotLockable(i64),

    // ── Epoch errors ─────────────────────────────────────────────────────────
    #[error("epoch not found: {0}")]
    EpochNotFound(String),

    #[error("epoch processing failed: {0}")]
    EpochProcessing(String),

    // ── Genesis ──────────────────────────────────────────────────────────────
    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error("state already initialised")]
    AlreadyInitialised,

    // ── Fatal ────────────────────────────────────────────────────────────────
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] DecimalError),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl AccrualError {
    /// Fatal errors mean the state machine can no longer be trusted and
    /// must halt. Everything else rejects only the triggering event.
    pub fn is_fatal(&self) -> bool {
        match self {
            AccrualError::Arithmetic(e) => !matches!(e, DecimalError::Parse(_)),
            AccrualError::Overflow(_)
            | AccrualError::Invariant(_)
            | AccrualError::Serialization(_)
            | AccrualError::Storage(_)
            | AccrualError::EpochProcessing(_) => true,
            _ => false,
        }
    }
}
