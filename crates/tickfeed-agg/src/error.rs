//! Aggregator error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggError {
    #[error("Aggregator task terminated")]
    Terminated,
}

pub type AggResult<T> = Result<T, AggError>;
