use thiserror::Error;

#[derive(Debug, Error)]
pub enum FxError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("No exchange rate available for {from}/{to} as of {as_of}")]
    NoRateAvailable {
        from: String,
        to: String,
        as_of: chrono::NaiveDate,
    },

    #[error("Invalid currency code: {0}")]
    InvalidCurrencyCode(String),

    #[error("Invalid exchange rate: {0}")]
    InvalidRate(String),
}

impl From<diesel::result::Error> for FxError {
    fn from(err: diesel::result::Error) -> Self {
        FxError::DatabaseError(err.to_string())
    }
}
