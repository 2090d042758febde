use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] database_layer::DatabaseError),

    #[error("Audit entry validation failed: {0}")]
    Validation(String),

    #[error("Stored audit record is invalid: {0}")]
    InvalidRecord(String),
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;
