use thiserror::Error;

use crate::provider::ProviderError;
use crate::vault::VaultError;

/// Errors raised by the connection lifecycle and the sync worker
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("A sync is already running for this connection")]
    AlreadyRunning,

    #[error("Connection not found: {0}")]
    NotFound(String),

    #[error("Connection has no provider identity; complete login first")]
    MissingIdentity,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl From<diesel::result::Error> for SyncError {
    fn from(err: diesel::result::Error) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
