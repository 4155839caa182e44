use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_DISTR_EPOCH_IDENTIFIER;

/// Incentives parameters, set at genesis or by an admin action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Gauges distribute at the end of epochs with this identifier only.
    pub distr_epoch_identifier: String,
}

impl Default for Params {
    fn default() -> Self {
        Self { distr_epoch_identifier: DEFAULT_DISTR_EPOCH_IDENTIFIER.to_string() }
    }
}
