//! Error types for station-calc

use thiserror::Error;

/// Calculation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    #[error("Overflow: {0}")]
    Overflow(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CalcError {
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    pub fn division_by_zero(context: impl Into<String>) -> Self {
        Self::DivisionByZero(context.into())
    }

    pub fn overflow(context: impl Into<String>) -> Self {
        Self::Overflow(context.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
