//! Error types for the rate limiter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] database_layer::DatabaseError),

    #[error("Invalid rate limit policy for '{action}': {reason}")]
    InvalidPolicy { action: String, reason: String },

    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}

pub type RateLimitResult<T> = Result<T, RateLimitError>;
