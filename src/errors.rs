use diesel::result::Error as DieselError;
use thiserror::Error;

use crate::connections::SyncError;
use crate::fx::FxError;
use crate::provider::ProviderError;
use crate::tax::TaxError;
use crate::vault::VaultError;

// Create a type alias for Result using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the back-office engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Credential vault operation failed: {0}")]
    Vault(#[from] VaultError),

    #[error("Provider request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Currency operation failed: {0}")]
    Currency(#[from] FxError),

    #[error("Tax computation failed: {0}")]
    Tax(#[from] TaxError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("App configuration failed: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(#[from] diesel::result::ConnectionError),

    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(#[from] r2d2::Error),

    #[error("Database query failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Database migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

// Implement From for DieselError to Error directly
impl From<DieselError> for Error {
    fn from(err: DieselError) -> Self {
        Error::Database(DatabaseError::QueryFailed(err))
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Database(DatabaseError::PoolCreationFailed(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}
