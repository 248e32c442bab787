use chrono::{Duration, Utc};
use log::debug;
use std::sync::Arc;

use crate::constants::TOKEN_REFRESH_MARGIN_SECS;
use crate::provider::{ProviderSession, WealthsimpleApi};
use crate::vault::CredentialVault;

use super::connections_model::Connection;
use super::sync_errors::Result;

/// Applies the token-freshness policy: any access token within five minutes
/// of expiry is rotated through the refresh grant before use.
pub struct TokenRefresher {
    api: Arc<dyn WealthsimpleApi>,
    vault: Arc<CredentialVault>,
}

impl TokenRefresher {
    pub fn new(api: Arc<dyn WealthsimpleApi>, vault: Arc<CredentialVault>) -> Self {
        Self { api, vault }
    }

    pub fn provider_session(connection: &Connection) -> ProviderSession {
        ProviderSession {
            device_id: connection.device_id.clone(),
            session_id: connection.session_id.clone(),
            app_instance_id: connection.app_instance_id.clone(),
        }
    }

    /// Returns a usable access token for the connection, refreshing and
    /// persisting the pair first when the stored token is stale.
    pub async fn fresh_access_token(&self, connection: &Connection) -> Result<String> {
        let needs_refresh = match connection.token_expires_at {
            Some(expires_at) => {
                expires_at <= Utc::now().naive_utc() + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)
            }
            None => true,
        };

        if !needs_refresh {
            let access = self.vault.decrypt_required(
                connection.encrypted_access_token.as_ref(),
                "access_token",
            )?;
            return Ok(access);
        }

        debug!("Access token for connection {} is stale, refreshing", connection.id);

        let refresh_token = self.vault.decrypt_required(
            connection.encrypted_refresh_token.as_ref(),
            "refresh_token",
        )?;

        let session = Self::provider_session(connection);
        let tokens = self.api.refresh(&session, &refresh_token).await?;

        self.vault.rotate_tokens(
            &connection.id,
            &tokens.access_token,
            &tokens.refresh_token,
            tokens.expires_at,
        )?;

        Ok(tokens.access_token)
    }
}

impl Clone for TokenRefresher {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            vault: self.vault.clone(),
        }
    }
}
