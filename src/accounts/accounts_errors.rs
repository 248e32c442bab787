use diesel::result::Error as DieselError;
use thiserror::Error;

/// Failures raised by the account stack
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<DieselError> for AccountError {
    fn from(err: DieselError) -> Self {
        if matches!(err, DieselError::NotFound) {
            AccountError::NotFound("Requested account row is gone".to_string())
        } else {
            AccountError::DatabaseError(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AccountError>;
