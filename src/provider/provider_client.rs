use log::{debug, warn};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use async_trait::async_trait;

use crate::constants::{
    ENV_AUTH_BASE_URL, ENV_GRAPHQL_URL, PROVIDER_REQUEST_TIMEOUT_SECS, WEALTHSIMPLE_AUTH_BASE_URL,
    WEALTHSIMPLE_CLIENT_ID, WEALTHSIMPLE_GRAPHQL_URL, WS_API_VERSION, WS_CLIENT_LIBRARY,
    WS_LOCALE, WS_PLATFORM_OS,
};

use super::provider_errors::ProviderError;
use super::provider_model::{
    AccountFinancials, AccountFinancialsData, CreditCardAccountData, GraphQlEnvelope,
    ListAccountsData, LoginOutcome, PositionsData, ProviderAccount, ProviderPosition,
    ProviderSession, RequestContext, TokenInfo, TokenResponse, Tokens,
};
use super::queries;
use super::WealthsimpleApi;

const HEADER_CLIENT: HeaderName = HeaderName::from_static("x-wealthsimple-client");
const HEADER_API_VERSION: HeaderName = HeaderName::from_static("x-ws-api-version");
const HEADER_DEVICE_ID: HeaderName = HeaderName::from_static("x-ws-device-id");
const HEADER_SESSION_ID: HeaderName = HeaderName::from_static("x-ws-session-id");
const HEADER_APP_INSTANCE_ID: HeaderName = HeaderName::from_static("x-app-instance-id");
const HEADER_PLATFORM_OS: HeaderName = HeaderName::from_static("x-platform-os");
const HEADER_PROFILE: HeaderName = HeaderName::from_static("x-ws-profile");
const HEADER_CLIENT_LIBRARY: HeaderName = HeaderName::from_static("x-ws-client-library");
const HEADER_LOCALE: HeaderName = HeaderName::from_static("x-ws-locale");
const HEADER_OTP: HeaderName = HeaderName::from_static("x-wealthsimple-otp");
const HEADER_OTP_REQUIRED: HeaderName = HeaderName::from_static("x-wealthsimple-otp-required");
const HEADER_OTP_CLAIM: HeaderName =
    HeaderName::from_static("x-wealthsimple-otp-authenticated-claim");

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;
const POSITIONS_PAGE_SIZE: i64 = 250;

fn env_url(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Stateless HTTP + GraphQL client for the Wealthsimple API.
///
/// All identity lives in the `ProviderSession`/`RequestContext` arguments;
/// one client instance serves every connection.
pub struct WealthsimpleClient {
    http: Client,
    auth_base_url: String,
    graphql_url: String,
}

impl WealthsimpleClient {
    pub fn new() -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            auth_base_url: env_url(ENV_AUTH_BASE_URL, WEALTHSIMPLE_AUTH_BASE_URL),
            graphql_url: env_url(ENV_GRAPHQL_URL, WEALTHSIMPLE_GRAPHQL_URL),
        })
    }

    fn base_headers(&self, session: &ProviderSession) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CLIENT, HeaderValue::from_static(WEALTHSIMPLE_CLIENT_ID));
        headers.insert(HEADER_API_VERSION, HeaderValue::from_static(WS_API_VERSION));
        headers.insert(HEADER_PLATFORM_OS, HeaderValue::from_static(WS_PLATFORM_OS));
        headers.insert(HEADER_DEVICE_ID, header_value(&session.device_id)?);
        headers.insert(HEADER_SESSION_ID, header_value(&session.session_id)?);
        headers.insert(HEADER_APP_INSTANCE_ID, header_value(&session.app_instance_id)?);
        Ok(headers)
    }

    fn graphql_headers(&self, ctx: &RequestContext) -> Result<HeaderMap, ProviderError> {
        let mut headers = self.base_headers(&ctx.session)?;
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", ctx.access_token))?,
        );
        headers.insert(HEADER_PROFILE, header_value(&ctx.profile)?);
        headers.insert(HEADER_CLIENT_LIBRARY, HeaderValue::from_static(WS_CLIENT_LIBRARY));
        headers.insert(HEADER_LOCALE, HeaderValue::from_static(WS_LOCALE));
        Ok(headers)
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/v2/token", self.auth_base_url)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = match &err {
                        ProviderError::RateLimited {
                            retry_after_secs: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => backoff_delay(attempt),
                    };
                    debug!("{} attempt {} failed ({}), retrying in {:?}", operation, attempt + 1, err, delay);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(ProviderError::RateLimited { .. }) => {
                    // Exhausted retry budget while rate limited
                    return Err(ProviderError::Transient(format!(
                        "{} still rate limited after {} attempts",
                        operation, MAX_ATTEMPTS
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn password_grant(
        &self,
        session: &ProviderSession,
        username: &str,
        password: &str,
        otp: Option<(&str, &str)>,
    ) -> Result<Response, ProviderError> {
        let mut request = self
            .http
            .post(self.token_url())
            .headers(self.base_headers(session)?)
            .json(&json!({
                "grant_type": "password",
                "username": username,
                "password": password,
                "client_id": WEALTHSIMPLE_CLIENT_ID,
                "scope": "invest.read trade.read",
            }));

        if let Some((code, claim)) = otp {
            request = request
                .header(HEADER_OTP, header_value(code)?)
                .header(HEADER_OTP_CLAIM, header_value(claim)?);
        }

        Ok(request.send().await?)
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ProviderError> {
        self.with_retry(operation, || {
            let variables = variables.clone();
            async move {
                let response = self
                    .http
                    .post(&self.graphql_url)
                    .headers(self.graphql_headers(ctx)?)
                    .json(&json!({
                        "operationName": operation,
                        "query": query,
                        "variables": variables,
                    }))
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(classify_http_failure(status, &response));
                }

                let envelope: GraphQlEnvelope = parse_json(response, operation).await?;

                if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
                    let message = errors
                        .into_iter()
                        .map(|e| e.message)
                        .collect::<Vec<_>>()
                        .join("; ");
                    if is_auth_message(&message) {
                        return Err(ProviderError::AuthFailed(message));
                    }
                    return Err(ProviderError::InvalidResponse(message));
                }

                let data = envelope.data.ok_or_else(|| {
                    ProviderError::SchemaMismatch(format!("{}: response carried no data", operation))
                })?;

                from_value_or_mismatch(data, operation)
            }
        })
        .await
    }
}

#[async_trait]
impl WealthsimpleApi for WealthsimpleClient {
    /// Issues a password grant. The 401 carrying an OTP challenge is the
    /// normal first step of the login flow, not a failure.
    async fn login(
        &self,
        session: &ProviderSession,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, ProviderError> {
        self.with_retry("login", || async move {
            let response = self.password_grant(session, username, password, None).await?;
            let status = response.status();

            if status.is_success() {
                let tokens: TokenResponse = parse_json(response, "login").await?;
                return Ok(LoginOutcome::Authenticated(tokens.into_tokens()));
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let otp_required = response
                    .headers()
                    .get(&HEADER_OTP_REQUIRED)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);

                if otp_required {
                    let claim = response
                        .headers()
                        .get(&HEADER_OTP_CLAIM)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.to_string())
                        .ok_or_else(|| {
                            ProviderError::InvalidResponse(
                                "OTP challenge without authenticated claim".to_string(),
                            )
                        })?;
                    return Ok(LoginOutcome::OtpRequired { otp_claim: claim });
                }

                return Err(ProviderError::AuthFailed(format!(
                    "provider rejected credentials (HTTP {})",
                    status
                )));
            }

            Err(classify_http_failure(status, &response))
        })
        .await
    }

    async fn verify_otp(
        &self,
        session: &ProviderSession,
        username: &str,
        password: &str,
        otp_code: &str,
        otp_claim: &str,
    ) -> Result<Tokens, ProviderError> {
        self.with_retry("verify_otp", || async move {
            let response = self
                .password_grant(session, username, password, Some((otp_code, otp_claim)))
                .await?;
            let status = response.status();

            if status.is_success() {
                let tokens: TokenResponse = parse_json(response, "verify_otp").await?;
                return Ok(tokens.into_tokens());
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ProviderError::AuthFailed(
                    "invalid one-time passcode".to_string(),
                ));
            }

            Err(classify_http_failure(status, &response))
        })
        .await
    }

    /// Exchanges the refresh token for a new pair; both tokens rotate.
    async fn refresh(
        &self,
        session: &ProviderSession,
        refresh_token: &str,
    ) -> Result<Tokens, ProviderError> {
        self.with_retry("refresh", || async move {
            let response = self
                .http
                .post(self.token_url())
                .headers(self.base_headers(session)?)
                .json(&json!({
                    "grant_type": "refresh_token",
                    "refresh_token": refresh_token,
                    "client_id": WEALTHSIMPLE_CLIENT_ID,
                }))
                .send()
                .await?;
            let status = response.status();

            if status.is_success() {
                let tokens: TokenResponse = parse_json(response, "refresh").await?;
                return Ok(tokens.into_tokens());
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ProviderError::AuthFailed("invalid grant".to_string()));
            }

            Err(classify_http_failure(status, &response))
        })
        .await
    }

    async fn check_token_info(
        &self,
        session: &ProviderSession,
        access_token: &str,
    ) -> Result<TokenInfo, ProviderError> {
        self.with_retry("check_token_info", || async move {
            let response = self
                .http
                .get(format!("{}/oauth/v2/token/info", self.auth_base_url))
                .headers(self.base_headers(session)?)
                .header(AUTHORIZATION, header_value(&format!("Bearer {}", access_token))?)
                .send()
                .await?;
            let status = response.status();

            if status.is_success() {
                return parse_json(response, "check_token_info").await;
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ProviderError::AuthFailed("token no longer valid".to_string()));
            }

            Err(classify_http_failure(status, &response))
        })
        .await
    }

    async fn list_accounts(
        &self,
        ctx: &RequestContext,
        identity_id: &str,
    ) -> Result<Vec<ProviderAccount>, ProviderError> {
        let data: ListAccountsData = self
            .graphql(
                ctx,
                queries::LIST_ACCOUNTS_OPERATION,
                queries::LIST_ACCOUNTS_QUERY,
                json!({ "identityId": identity_id }),
            )
            .await?;

        Ok(data
            .identity
            .accounts
            .edges
            .into_iter()
            .map(|edge| edge.node)
            .collect())
    }

    async fn fetch_account_financials(
        &self,
        ctx: &RequestContext,
        account_ids: &[String],
    ) -> Result<Vec<AccountFinancials>, ProviderError> {
        let data: AccountFinancialsData = self
            .graphql(
                ctx,
                queries::FETCH_ACCOUNT_DETAILS_OPERATION,
                queries::FETCH_ACCOUNT_DETAILS_QUERY,
                json!({ "ids": account_ids }),
            )
            .await?;

        Ok(data
            .accounts
            .into_iter()
            .map(|node| AccountFinancials::from_node(node, false))
            .collect())
    }

    async fn fetch_credit_card_account(
        &self,
        ctx: &RequestContext,
        account_id: &str,
    ) -> Result<AccountFinancials, ProviderError> {
        let data: CreditCardAccountData = self
            .graphql(
                ctx,
                queries::FETCH_CREDIT_CARD_ACCOUNT_OPERATION,
                queries::FETCH_CREDIT_CARD_ACCOUNT_QUERY,
                json!({ "id": account_id }),
            )
            .await?;

        Ok(AccountFinancials::from_node(data.credit_card_account, true))
    }

    async fn fetch_positions(
        &self,
        ctx: &RequestContext,
        identity_id: &str,
        account_id: &str,
        currency: &str,
    ) -> Result<Vec<ProviderPosition>, ProviderError> {
        let data: PositionsData = self
            .graphql(
                ctx,
                queries::FETCH_ACCOUNT_POSITIONS_OPERATION,
                queries::FETCH_ACCOUNT_POSITIONS_QUERY,
                json!({
                    "identityId": identity_id,
                    "currency": currency,
                    "accountIds": [account_id],
                    "first": POSITIONS_PAGE_SIZE,
                }),
            )
            .await?;

        Ok(data
            .identity
            .positions
            .edges
            .into_iter()
            .map(|edge| ProviderPosition::from(edge.node))
            .collect())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(value)
        .map_err(|_| ProviderError::InvalidResponse("header value not representable".to_string()))
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS << attempt;
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_BASE_MS / 2);
    Duration::from_millis(base + jitter)
}

fn classify_http_failure(status: StatusCode, response: &Response) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return ProviderError::RateLimited { retry_after_secs };
    }
    if status.is_server_error() {
        return ProviderError::Transient(format!("provider returned HTTP {}", status));
    }
    ProviderError::InvalidResponse(format!("provider returned HTTP {}", status))
}

fn is_auth_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("not authenticated")
        || lowered.contains("unauthorized")
        || lowered.contains("access denied")
}

async fn parse_json<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, ProviderError> {
    let value: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    from_value_or_mismatch(value, context)
}

/// Deserializes into the expected shape; on mismatch records only the
/// top-level keys, never values.
fn from_value_or_mismatch<T: DeserializeOwned>(
    value: serde_json::Value,
    context: &str,
) -> Result<T, ProviderError> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => Ok(parsed),
        Err(_) => {
            let keys = match &value {
                serde_json::Value::Object(map) => {
                    map.keys().cloned().collect::<Vec<_>>().join(", ")
                }
                other => format!("(non-object: {})", json_kind(other)),
            };
            warn!("{}: unexpected response shape, top-level keys: [{}]", context, keys);
            Err(ProviderError::SchemaMismatch(format!(
                "{}: unexpected shape with keys [{}]",
                context, keys
            )))
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempts() {
        let first = backoff_delay(0);
        let third = backoff_delay(2);
        assert!(first >= Duration::from_millis(BACKOFF_BASE_MS));
        assert!(third >= Duration::from_millis(BACKOFF_BASE_MS * 4));
    }

    #[test]
    fn schema_mismatch_reports_keys_only() {
        let value = serde_json::json!({ "surprise": { "secret": "value" }, "other": 1 });
        let err = from_value_or_mismatch::<ListAccountsData>(value, "ListAccounts").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("surprise"));
        assert!(message.contains("other"));
        assert!(!message.contains("value"));
    }

    #[test]
    fn auth_messages_are_recognized() {
        assert!(is_auth_message("Request not authenticated"));
        assert!(is_auth_message("UNAUTHORIZED"));
        assert!(!is_auth_message("field `foo` not found"));
    }
}
