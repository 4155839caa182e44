use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalError {
    /// Fatal: the result magnitude exceeds the fixed bit bound.
    #[error("decimal overflow: result exceeds {max_bits} bits")]
    Overflow { max_bits: u64 },

    #[error("decimal division by zero")]
    DivisionByZero,

    #[error("negative decimal {0} cannot be converted to an unsigned amount")]
    Negative(String),

    #[error("invalid decimal string: {0}")]
    Parse(String),
}

impl DecimalError {
    /// Overflow means the enclosing state transition must abort.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecimalError::Overflow { .. })
    }
}
