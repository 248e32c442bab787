use log::{info, warn};
use std::sync::Arc;

use crate::constants::PROVIDER_WEALTHSIMPLE;
use crate::provider::{identity_from_access_token, LoginOutcome, Tokens, WealthsimpleApi};
use crate::sync::{SyncHandle, SyncRepository};
use crate::vault::{CredentialFields, CredentialVault};

use super::connections_model::{ConnectionStatus, ConnectionSummary, SyncFrequency};
use super::connections_repository::ConnectionRepository;
use super::sync_errors::{Result, SyncError};
use super::token_refresher::TokenRefresher;

/// Canonical user-visible message for auth-classified sync failures
pub const CANONICAL_AUTH_MESSAGE: &str = "Authentication failed - please login again";

/// Message recorded when lazy session validation finds a dead token
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired - please login again";

// Compatibility contract: provider error strings carrying any of these
// markers are treated as authentication failures.
const AUTH_ERROR_MARKERS: &[&str] = &[
    "401",
    "unauthorized",
    "authentication failed",
    "invalid credentials",
    "access denied",
    "not authenticated",
];

/// Classifies a sync failure message into the next connection state.
/// Auth-like failures disconnect with the canonical message; everything else
/// lands in `error` with the raw message preserved.
pub fn classify_sync_error(message: &str) -> (ConnectionStatus, String) {
    let lowered = message.to_lowercase();
    if AUTH_ERROR_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        (
            ConnectionStatus::Disconnected,
            CANONICAL_AUTH_MESSAGE.to_string(),
        )
    } else {
        (ConnectionStatus::Error, message.to_string())
    }
}

/// Connection lifecycle state machine:
/// `new -> awaiting_otp -> syncing -> connected`, with `error` and
/// `disconnected` as terminals.
pub struct ConnectionService {
    repository: Arc<ConnectionRepository>,
    sync_repository: Arc<SyncRepository>,
    accounts: Arc<crate::accounts::AccountService>,
    vault: Arc<CredentialVault>,
    api: Arc<dyn WealthsimpleApi>,
    refresher: TokenRefresher,
    sync_handle: SyncHandle,
}

impl ConnectionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<ConnectionRepository>,
        sync_repository: Arc<SyncRepository>,
        accounts: Arc<crate::accounts::AccountService>,
        vault: Arc<CredentialVault>,
        api: Arc<dyn WealthsimpleApi>,
        sync_handle: SyncHandle,
    ) -> Self {
        let refresher = TokenRefresher::new(api.clone(), vault.clone());
        Self {
            repository,
            sync_repository,
            accounts,
            vault,
            api,
            refresher,
            sync_handle,
        }
    }

    /// Starts a new connection: stores encrypted credentials under stable
    /// device identifiers and issues the password grant. The usual outcome
    /// is an OTP challenge.
    pub async fn initiate(
        &self,
        user_id: &str,
        username: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<ConnectionSummary> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(SyncError::Validation(
                "Username and password are required".to_string(),
            ));
        }

        // Device identifiers are generated once per connection and reused on
        // re-authentication; fresh ids on every login trip the provider's
        // device heuristics.
        let existing = self
            .repository
            .find_by_user_provider(user_id, PROVIDER_WEALTHSIMPLE)?;
        let (device_id, session_id, app_instance_id) = match &existing {
            Some(connection) => (
                connection.device_id.clone(),
                connection.session_id.clone(),
                connection.app_instance_id.clone(),
            ),
            None => (
                uuid::Uuid::new_v4().to_string(),
                uuid::Uuid::new_v4().to_string(),
                uuid::Uuid::new_v4().to_string(),
            ),
        };

        let connection = self.vault.put_credential(
            user_id,
            PROVIDER_WEALTHSIMPLE,
            CredentialFields {
                display_name: display_name.unwrap_or("Wealthsimple").to_string(),
                username: username.to_string(),
                password: password.to_string(),
            },
            device_id,
            session_id,
            app_instance_id,
        )?;

        let session = TokenRefresher::provider_session(&connection);
        match self.api.login(&session, username, password).await? {
            LoginOutcome::OtpRequired { otp_claim } => {
                self.vault.store_otp_claim(&connection.id, &otp_claim)?;
                info!("Connection {} awaiting OTP", connection.id);
            }
            LoginOutcome::Authenticated(tokens) => {
                // Unusual path: the provider skipped the OTP challenge
                self.persist_tokens_and_identity(&connection.id, &tokens)?;
                self.vault.clear_password_material(&connection.id)?;
                self.repository
                    .set_status(&connection.id, ConnectionStatus::Syncing)?;
                self.sync_handle.submit(&connection.id)?;
            }
        }

        let refreshed = self.repository.get_by_id(&connection.id)?;
        Ok(ConnectionSummary::from(&refreshed))
    }

    /// Completes the OTP challenge, persists the token pair, wipes password
    /// material and spawns the initial sync.
    pub async fn verify_otp(&self, connection_id: &str, otp_code: &str) -> Result<ConnectionSummary> {
        let connection = self.repository.get_by_id(connection_id)?;

        if connection.status != ConnectionStatus::AwaitingOtp {
            return Err(SyncError::Validation(format!(
                "Connection is not awaiting OTP (state: {})",
                connection.status.as_str()
            )));
        }
        if otp_code.trim().is_empty() {
            return Err(SyncError::Validation("OTP code is required".to_string()));
        }

        let username = self
            .vault
            .decrypt_required(connection.encrypted_username.as_ref(), "username")?;
        let password = self
            .vault
            .decrypt_required(connection.encrypted_password.as_ref(), "password")?;
        let otp_claim = self
            .vault
            .decrypt_required(connection.encrypted_otp_claim.as_ref(), "otp_claim")?;

        let session = TokenRefresher::provider_session(&connection);
        let tokens = self
            .api
            .verify_otp(&session, &username, &password, otp_code.trim(), &otp_claim)
            .await?;

        self.persist_tokens_and_identity(&connection.id, &tokens)?;
        self.vault.clear_password_material(&connection.id)?;
        self.repository
            .set_status(&connection.id, ConnectionStatus::Syncing)?;

        self.sync_handle.submit(&connection.id)?;

        let refreshed = self.repository.get_by_id(&connection.id)?;
        Ok(ConnectionSummary::from(&refreshed))
    }

    fn persist_tokens_and_identity(&self, connection_id: &str, tokens: &Tokens) -> Result<()> {
        self.vault.rotate_tokens(
            connection_id,
            &tokens.access_token,
            &tokens.refresh_token,
            tokens.expires_at,
        )?;

        let identity = tokens
            .identity_id
            .clone()
            .or_else(|| identity_from_access_token(&tokens.access_token));

        if let Some(identity) = identity {
            self.repository.set_identity(
                connection_id,
                &identity,
                &tokens.profiles,
                tokens.email.as_deref(),
            )?;
        }

        Ok(())
    }

    /// Secret-free listing of a user's connections
    pub fn list_connections(&self, user_id: &str) -> Result<Vec<ConnectionSummary>> {
        let connections = self.repository.list_by_user(user_id)?;
        Ok(connections.iter().map(ConnectionSummary::from).collect())
    }

    pub fn get_connection(&self, connection_id: &str) -> Result<ConnectionSummary> {
        let connection = self.repository.get_by_id(connection_id)?;
        Ok(ConnectionSummary::from(&connection))
    }

    /// Lazily validates sessions of connected rows. The listing endpoint
    /// composes this explicitly so the plain read path stays free of hidden
    /// writes.
    pub async fn refresh_states(&self, user_id: &str) -> Result<Vec<ConnectionSummary>> {
        let connections = self.repository.list_by_user(user_id)?;

        for connection in &connections {
            if connection.status != ConnectionStatus::Connected {
                continue;
            }
            let Some(access_ct) = connection.encrypted_access_token.as_ref() else {
                continue;
            };
            let Ok(access_token) = self.vault.decrypt(access_ct) else {
                self.repository.set_status_with_error(
                    &connection.id,
                    ConnectionStatus::Disconnected,
                    SESSION_EXPIRED_MESSAGE,
                )?;
                continue;
            };

            let session = TokenRefresher::provider_session(connection);
            match self.api.check_token_info(&session, &access_token).await {
                Ok(_) => {}
                Err(crate::provider::ProviderError::AuthFailed(_)) => {
                    self.repository.set_status_with_error(
                        &connection.id,
                        ConnectionStatus::Disconnected,
                        SESSION_EXPIRED_MESSAGE,
                    )?;
                }
                Err(err) => {
                    // A transient validation hiccup is not a dead session
                    warn!(
                        "Session validation for connection {} inconclusive: {}",
                        connection.id, err
                    );
                }
            }
        }

        self.list_connections(user_id)
    }

    /// Queues a manual sync run for the connection
    pub fn trigger_sync(&self, connection_id: &str) -> Result<()> {
        // Reject early while a worker holds the connection lease
        self.sync_handle.submit(connection_id)
    }

    pub fn update_sync_frequency(
        &self,
        connection_id: &str,
        frequency: SyncFrequency,
    ) -> Result<()> {
        self.repository.get_by_id(connection_id)?;
        self.repository
            .update_sync_frequency(connection_id, frequency)
    }

    /// Drops the token pair and marks the connection disconnected; the row
    /// and its synced accounts survive for a later re-login.
    pub fn disconnect(&self, connection_id: &str) -> Result<ConnectionSummary> {
        self.repository.get_by_id(connection_id)?;
        self.repository.clear_tokens(connection_id)?;
        self.repository.set_status_with_error(
            connection_id,
            ConnectionStatus::Disconnected,
            SESSION_EXPIRED_MESSAGE,
        )?;
        self.get_connection(connection_id)
    }

    /// Deletes a connection and everything it brought in: synced-account
    /// rows cascade in the database, the underlying local accounts are
    /// removed here.
    pub fn delete_connection(&self, connection_id: &str) -> Result<()> {
        let synced = self.sync_repository.list_by_connection(connection_id)?;
        for synced_account in &synced {
            if let Err(err) = self.accounts.delete_account(&synced_account.account_id) {
                warn!(
                    "Failed to delete local account {} while removing connection {}: {}",
                    synced_account.account_id, connection_id, err
                );
            }
        }
        self.repository.delete(connection_id)?;
        Ok(())
    }

    pub fn token_refresher(&self) -> TokenRefresher {
        self.refresher.clone()
    }
}
