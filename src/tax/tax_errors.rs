use thiserror::Error;

use crate::fx::FxError;

#[derive(Debug, Error)]
pub enum TaxError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Requested quantity {requested} exceeds available {available} for grant {grant_id}"
    )]
    ExceedsAvailableQuantity {
        grant_id: String,
        requested: f64,
        available: f64,
    },

    #[error(transparent)]
    Currency(#[from] FxError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<diesel::result::Error> for TaxError {
    fn from(err: diesel::result::Error) -> Self {
        TaxError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaxError>;
