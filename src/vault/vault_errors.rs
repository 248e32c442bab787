use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid master key: {0}")]
    InvalidMasterKey(String),

    #[error("Encryption failed")]
    EncryptFailed,

    #[error("Session expired - please login again")]
    DecryptFailed,

    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
