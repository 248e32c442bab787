pub(crate) mod provider_client;
pub(crate) mod provider_errors;
pub(crate) mod provider_model;
pub(crate) mod queries;

pub use provider_client::WealthsimpleClient;
pub use provider_errors::ProviderError;
pub use provider_model::{
    identity_from_access_token, AccountFinancials, LoginOutcome, ProviderAccount,
    ProviderPosition, ProviderSession, RequestContext, TokenInfo, Tokens,
};
pub use queries::{profile_for_account_type, PROFILE_INVEST, PROFILE_TRADE};

use async_trait::async_trait;

/// Contract for the external brokerage API. The sync worker and the
/// connection state machine depend on this seam so tests can substitute a
/// scripted provider.
#[async_trait]
pub trait WealthsimpleApi: Send + Sync {
    async fn login(
        &self,
        session: &ProviderSession,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, ProviderError>;

    async fn verify_otp(
        &self,
        session: &ProviderSession,
        username: &str,
        password: &str,
        otp_code: &str,
        otp_claim: &str,
    ) -> Result<Tokens, ProviderError>;

    async fn refresh(
        &self,
        session: &ProviderSession,
        refresh_token: &str,
    ) -> Result<Tokens, ProviderError>;

    async fn check_token_info(
        &self,
        session: &ProviderSession,
        access_token: &str,
    ) -> Result<TokenInfo, ProviderError>;

    async fn list_accounts(
        &self,
        ctx: &RequestContext,
        identity_id: &str,
    ) -> Result<Vec<ProviderAccount>, ProviderError>;

    async fn fetch_account_financials(
        &self,
        ctx: &RequestContext,
        account_ids: &[String],
    ) -> Result<Vec<AccountFinancials>, ProviderError>;

    async fn fetch_credit_card_account(
        &self,
        ctx: &RequestContext,
        account_id: &str,
    ) -> Result<AccountFinancials, ProviderError>;

    async fn fetch_positions(
        &self,
        ctx: &RequestContext,
        identity_id: &str,
        account_id: &str,
        currency: &str,
    ) -> Result<Vec<ProviderPosition>, ProviderError>;
}
