//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Aggregator error: {0}")]
    Aggregator(#[from] tickfeed_agg::AggError),
}

pub type AppResult<T> = Result<T, AppError>;
