//! Core error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
