use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::constants::DEFAULT_TOKEN_TTL_SECS;

/// Stable per-connection identifiers sent on every provider request.
/// The provider's security heuristics expect these to persist across
/// sessions.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub device_id: String,
    pub session_id: String,
    pub app_instance_id: String,
}

/// Context for an authenticated data request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session: ProviderSession,
    pub access_token: String,
    pub profile: String,
}

/// A rotated token pair plus the identity metadata issued alongside it
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: NaiveDateTime,
    pub identity_id: Option<String>,
    pub profiles: HashMap<String, String>,
    pub email: Option<String>,
}

/// Outcome of a password grant. The OTP challenge is the normal path.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    OtpRequired { otp_claim: String },
    Authenticated(Tokens),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Wire model of the OAuth token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub identity_canonical_id: Option<String>,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileEntry>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileEntry {
    #[serde(default)]
    pub default: Option<String>,
}

impl TokenResponse {
    pub fn into_tokens(self) -> Tokens {
        let expires_at = Utc::now().naive_utc()
            + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));

        // Prefer the explicit identity field; fall back to the JWT subject
        let identity_id = self
            .identity_canonical_id
            .clone()
            .or_else(|| identity_from_access_token(&self.access_token));

        let profiles = self
            .profiles
            .into_iter()
            .filter_map(|(profile_name, entry)| entry.default.map(|id| (profile_name, id)))
            .collect();

        Tokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            identity_id,
            profiles,
            email: self.email,
        }
    }
}

/// Extracts the `sub` claim from a JWT access token without verifying it.
/// Used when the token body omits the identity id.
pub fn identity_from_access_token(access_token: &str) -> Option<String> {
    let payload = access_token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

// ── GraphQL wire models ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlEnvelope {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListAccountsData {
    pub identity: IdentityAccounts,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdentityAccounts {
    pub accounts: EdgeList<ProviderAccount>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EdgeList<T> {
    pub edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Edge<T> {
    pub node: T,
}

/// An account as enumerated by the provider
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccount {
    pub id: String,
    #[serde(rename = "unifiedAccountType")]
    pub account_type: String,
    pub status: String,
    pub currency: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl ProviderAccount {
    pub fn is_open(&self) -> bool {
        self.status.eq_ignore_ascii_case("open")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountFinancialsData {
    pub accounts: Vec<AccountFinancialsNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountFinancialsNode {
    pub id: String,
    #[serde(default)]
    pub financials: Option<FinancialsNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FinancialsNode {
    #[serde(default)]
    pub current_combined: Option<CurrentCombinedNode>,
    #[serde(default)]
    pub current_balance: Option<MoneyNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CurrentCombinedNode {
    #[serde(rename = "netLiquidationValueV2")]
    pub net_liquidation_value_v2: Option<MoneyNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MoneyNode {
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreditCardAccountData {
    pub credit_card_account: AccountFinancialsNode,
}

/// Extracted balance figures for one provider account
#[derive(Debug, Clone)]
pub struct AccountFinancials {
    pub account_id: String,
    pub balance: Option<f64>,
    pub currency: Option<String>,
}

impl AccountFinancials {
    pub(crate) fn from_node(node: AccountFinancialsNode, liability: bool) -> Self {
        let money = node.financials.and_then(|financials| {
            if liability {
                financials.current_balance
            } else {
                financials
                    .current_combined
                    .and_then(|combined| combined.net_liquidation_value_v2)
            }
        });

        Self {
            account_id: node.id,
            balance: money.as_ref().map(|m| m.amount),
            currency: money.and_then(|m| m.currency),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PositionsData {
    pub identity: IdentityPositions,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdentityPositions {
    pub positions: EdgeList<PositionNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PositionNode {
    #[serde(default)]
    pub security: Option<SecurityNode>,
    pub quantity: f64,
    #[serde(default)]
    pub average_cost: Option<MoneyNode>,
    #[serde(default)]
    pub total_value: Option<MoneyNode>,
    #[serde(rename = "type", default)]
    pub position_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SecurityNode {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub security_type: Option<String>,
}

/// A position held in a provider account
#[derive(Debug, Clone)]
pub struct ProviderPosition {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub security_type: String,
    pub quantity: f64,
    pub average_cost: Option<f64>,
    pub market_value: f64,
    pub currency: Option<String>,
}

impl From<PositionNode> for ProviderPosition {
    fn from(node: PositionNode) -> Self {
        let (symbol, name, security_type) = match node.security {
            Some(security) => (
                security.symbol,
                security.name,
                security.security_type.unwrap_or_else(|| "equity".to_string()),
            ),
            None => (None, None, node.position_type.unwrap_or_else(|| "cash".to_string())),
        };

        Self {
            symbol,
            name,
            security_type,
            quantity: node.quantity,
            average_cost: node.average_cost.as_ref().map(|m| m.amount),
            market_value: node.total_value.as_ref().map(|m| m.amount).unwrap_or(0.0),
            currency: node.total_value.and_then(|m| m.currency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;

    fn jwt_with_sub(sub: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{}","exp":1}}"#, sub));
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn extracts_identity_from_jwt_sub() {
        let token = jwt_with_sub("identity-abc123");
        assert_eq!(
            identity_from_access_token(&token),
            Some("identity-abc123".to_string())
        );
    }

    #[test]
    fn malformed_jwt_yields_none() {
        assert_eq!(identity_from_access_token("not-a-jwt"), None);
        assert_eq!(identity_from_access_token("a.%%%.c"), None);
    }

    #[test]
    fn token_response_prefers_explicit_identity() {
        let response = TokenResponse {
            access_token: jwt_with_sub("jwt-identity"),
            refresh_token: "refresh".to_string(),
            expires_in: Some(1800),
            identity_canonical_id: Some("explicit-identity".to_string()),
            profiles: HashMap::new(),
            email: None,
        };
        let tokens = response.into_tokens();
        assert_eq!(tokens.identity_id.as_deref(), Some("explicit-identity"));
    }

    #[test]
    fn token_response_falls_back_to_jwt_sub() {
        let response = TokenResponse {
            access_token: jwt_with_sub("jwt-identity"),
            refresh_token: "refresh".to_string(),
            expires_in: None,
            identity_canonical_id: None,
            profiles: HashMap::new(),
            email: None,
        };
        let tokens = response.into_tokens();
        assert_eq!(tokens.identity_id.as_deref(), Some("jwt-identity"));
    }

    #[test]
    fn financials_extraction_prefers_side_by_liability() {
        let node: AccountFinancialsNode = serde_json::from_value(serde_json::json!({
            "id": "acct-1",
            "financials": {
                "currentCombined": { "netLiquidationValueV2": { "amount": 1200.5, "currency": "CAD" } },
                "currentBalance": { "amount": 333.25, "currency": "CAD" }
            }
        }))
        .unwrap();

        let investment_node: AccountFinancialsNode = serde_json::from_value(serde_json::json!({
            "id": "acct-1",
            "financials": {
                "currentCombined": { "netLiquidationValueV2": { "amount": 1200.5, "currency": "CAD" } }
            }
        }))
        .unwrap();

        let investment = AccountFinancials::from_node(investment_node, false);
        assert_eq!(investment.balance, Some(1200.5));

        let liability = AccountFinancials::from_node(node, true);
        assert_eq!(liability.balance, Some(333.25));
    }
}
