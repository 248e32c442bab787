use thiserror::Error;

/// Failure taxonomy for provider calls. Only rate-limited and transient
/// failures are retried.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("One-time passcode required")]
    OtpRequired,

    #[error("Rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Unexpected provider response shape: {0}")]
    SchemaMismatch(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Transient(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Connection problems and timeouts are worth retrying; anything that
        // made it to a response body is handled at the call site.
        ProviderError::Transient(err.to_string())
    }
}
