use accrual_core::error::AccrualError;
use accrual_core::types::Timestamp;
use accrual_state::Txn;

/// Observers of epoch boundaries, called inside the block's transaction.
pub trait EpochHooks {
    /// Epoch `epoch_number` of `identifier` has just ended.
    fn after_epoch_end(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        identifier: &str,
        epoch_number: i64,
    ) -> Result<(), AccrualError>;

    /// Epoch `epoch_number` of `identifier` is about to start.
    fn before_epoch_start(
        &self,
        txn: &mut Txn<'_>,
        now: Timestamp,
        identifier: &str,
        epoch_number: i64,
    ) -> Result<(), AccrualError>;
}
