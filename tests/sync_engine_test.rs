mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use moneta_core::connections::{
    ConnectionRepository, ConnectionStatus, SyncError, TokenRefresher, CANONICAL_AUTH_MESSAGE,
};
use moneta_core::holdings::HoldingRepository;
use moneta_core::provider::{
    AccountFinancials, LoginOutcome, ProviderAccount, ProviderError, ProviderPosition,
    ProviderSession, RequestContext, TokenInfo, Tokens, WealthsimpleApi,
};
use moneta_core::sync::{SyncRepository, SyncWorker};
use moneta_core::vault::{Cipher, CredentialFields, CredentialVault, MasterKey};

const USER: &str = "user-1";
const PROVIDER: &str = "wealthsimple";

fn tokens(identity: &str) -> Tokens {
    Tokens {
        access_token: "access-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        expires_at: Utc::now().naive_utc() + Duration::minutes(30),
        identity_id: Some(identity.to_string()),
        profiles: HashMap::from([("invest".to_string(), "profile-1".to_string())]),
        email: Some("user@example.com".to_string()),
    }
}

/// Scripted provider standing in for the real API
struct MockApi {
    fail_accounts_with_auth: AtomicBool,
}

impl MockApi {
    fn new() -> Self {
        Self {
            fail_accounts_with_auth: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl WealthsimpleApi for MockApi {
    async fn login(
        &self,
        _session: &ProviderSession,
        _username: &str,
        _password: &str,
    ) -> Result<LoginOutcome, ProviderError> {
        Ok(LoginOutcome::OtpRequired {
            otp_claim: "claim-123".to_string(),
        })
    }

    async fn verify_otp(
        &self,
        _session: &ProviderSession,
        _username: &str,
        _password: &str,
        otp_code: &str,
        otp_claim: &str,
    ) -> Result<Tokens, ProviderError> {
        assert_eq!(otp_code, "123456");
        assert_eq!(otp_claim, "claim-123");
        Ok(tokens("identity-1"))
    }

    async fn refresh(
        &self,
        _session: &ProviderSession,
        _refresh_token: &str,
    ) -> Result<Tokens, ProviderError> {
        Ok(tokens("identity-1"))
    }

    async fn check_token_info(
        &self,
        _session: &ProviderSession,
        _access_token: &str,
    ) -> Result<TokenInfo, ProviderError> {
        Ok(TokenInfo {
            expires_in: 1_700,
            scope: None,
        })
    }

    async fn list_accounts(
        &self,
        _ctx: &RequestContext,
        identity_id: &str,
    ) -> Result<Vec<ProviderAccount>, ProviderError> {
        if self.fail_accounts_with_auth.load(Ordering::SeqCst) {
            return Err(ProviderError::AuthFailed("401 from provider".to_string()));
        }
        assert_eq!(identity_id, "identity-1");
        Ok(vec![
            ProviderAccount {
                id: "provider-acct-1".to_string(),
                account_type: "tfsa".to_string(),
                status: "open".to_string(),
                currency: "CAD".to_string(),
                nickname: Some("My TFSA".to_string()),
            },
            ProviderAccount {
                id: "provider-acct-closed".to_string(),
                account_type: "rrsp".to_string(),
                status: "closed".to_string(),
                currency: "CAD".to_string(),
                nickname: None,
            },
        ])
    }

    async fn fetch_account_financials(
        &self,
        _ctx: &RequestContext,
        account_ids: &[String],
    ) -> Result<Vec<AccountFinancials>, ProviderError> {
        Ok(account_ids
            .iter()
            .map(|id| AccountFinancials {
                account_id: id.clone(),
                balance: Some(12_345.67),
                currency: Some("CAD".to_string()),
            })
            .collect())
    }

    async fn fetch_credit_card_account(
        &self,
        _ctx: &RequestContext,
        account_id: &str,
    ) -> Result<AccountFinancials, ProviderError> {
        Ok(AccountFinancials {
            account_id: account_id.to_string(),
            balance: Some(432.10),
            currency: Some("CAD".to_string()),
        })
    }

    async fn fetch_positions(
        &self,
        _ctx: &RequestContext,
        _identity_id: &str,
        _account_id: &str,
        _currency: &str,
    ) -> Result<Vec<ProviderPosition>, ProviderError> {
        Ok(vec![ProviderPosition {
            symbol: Some("AAPL".to_string()),
            name: Some("Apple Inc.".to_string()),
            security_type: "equity".to_string(),
            quantity: 10.0,
            average_cost: Some(150.0),
            market_value: 1_700.0,
            currency: Some("USD".to_string()),
        }])
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    api: Arc<MockApi>,
    vault: Arc<CredentialVault>,
    connection_repository: Arc<ConnectionRepository>,
    sync_repository: Arc<SyncRepository>,
    holdings: Arc<HoldingRepository>,
    worker: SyncWorker,
}

fn build_harness() -> Harness {
    let (dir, pool) = common::test_pool();

    let api = Arc::new(MockApi::new());
    let connection_repository = Arc::new(ConnectionRepository::new(pool.clone()));
    let sync_repository = Arc::new(SyncRepository::new(pool.clone()));
    let accounts = Arc::new(moneta_core::accounts::AccountService::new(pool.clone()));
    let balances = Arc::new(moneta_core::balances::BalanceRepository::new(pool.clone()));
    let holdings = Arc::new(HoldingRepository::new(pool.clone()));

    let cipher = Cipher::new(MasterKey::from_bytes(&[42u8; 32]).unwrap());
    let vault = Arc::new(CredentialVault::new(cipher, connection_repository.clone()));

    let api_dyn: Arc<dyn WealthsimpleApi> = api.clone();
    let refresher = TokenRefresher::new(api_dyn.clone(), vault.clone());

    let worker = SyncWorker::new(
        connection_repository.clone(),
        sync_repository.clone(),
        accounts,
        balances,
        holdings.clone(),
        api_dyn,
        refresher,
    );

    Harness {
        _dir: dir,
        api,
        vault,
        connection_repository,
        sync_repository,
        holdings,
        worker,
    }
}

/// Creates a connected credential row with fresh tokens and identity,
/// mirroring the state after a completed OTP verification.
fn connected_connection(harness: &Harness) -> String {
    let connection = harness
        .vault
        .put_credential(
            USER,
            PROVIDER,
            CredentialFields {
                display_name: "Wealthsimple".to_string(),
                username: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            "device-1".to_string(),
            "session-1".to_string(),
            "app-1".to_string(),
        )
        .unwrap();

    harness
        .vault
        .rotate_tokens(
            &connection.id,
            "access-token",
            "refresh-token",
            Utc::now().naive_utc() + Duration::minutes(30),
        )
        .unwrap();
    harness
        .connection_repository
        .set_identity(
            &connection.id,
            "identity-1",
            &HashMap::from([("invest".to_string(), "profile-1".to_string())]),
            Some("user@example.com"),
        )
        .unwrap();
    harness.vault.clear_password_material(&connection.id).unwrap();
    harness
        .connection_repository
        .set_status(&connection.id, ConnectionStatus::Connected)
        .unwrap();

    connection.id
}

#[tokio::test]
async fn full_sync_is_idempotent_under_natural_keys() {
    let harness = build_harness();
    let connection_id = connected_connection(&harness);

    // First run creates the local account, its balance and its holding
    let first = harness.worker.sync_connection(&connection_id).await.unwrap();
    assert_eq!(first.accounts_synced, 1);
    assert_eq!(first.accounts_failed, 0);
    assert_eq!(first.items_created, 2);
    assert_eq!(first.items_updated, 0);

    let synced = harness
        .sync_repository
        .list_by_connection(&connection_id)
        .unwrap();
    assert_eq!(synced.len(), 1);
    assert_eq!(synced[0].provider_account_id, "provider-acct-1");

    // Second run with an identical provider response updates in place
    let second = harness.worker.sync_connection(&connection_id).await.unwrap();
    assert_eq!(second.items_created, 0);
    assert_eq!(second.items_updated, 2);

    // Still exactly one holding row for (account, AAPL)
    let holdings = harness
        .holdings
        .list_for_account(&synced[0].account_id)
        .unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].symbol.as_deref(), Some("AAPL"));
    assert_eq!(holdings[0].quantity, 10.0);

    // Every committed job satisfies processed = created + updated + failed
    let jobs = harness
        .sync_repository
        .list_jobs_for_connection(&connection_id)
        .unwrap();
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        assert_eq!(
            job.counters.processed,
            job.counters.created + job.counters.updated + job.counters.failed
        );
        let completed = job.completed_at.unwrap();
        assert!(completed >= job.started_at.unwrap());
    }

    // The connection row rolled up the run
    let connection = harness
        .connection_repository
        .get_by_id(&connection_id)
        .unwrap();
    assert_eq!(connection.status, ConnectionStatus::Connected);
    assert_eq!(connection.account_count, 1);
    assert!(connection.last_sync_at.is_some());
    assert!(connection.last_sync_error.is_none());
}

#[tokio::test]
async fn auth_failure_disconnects_with_canonical_message() {
    let harness = build_harness();
    let connection_id = connected_connection(&harness);

    harness
        .api
        .fail_accounts_with_auth
        .store(true, Ordering::SeqCst);

    let result = harness.worker.sync_connection(&connection_id).await;
    assert!(result.is_err());

    let connection = harness
        .connection_repository
        .get_by_id(&connection_id)
        .unwrap();
    assert_eq!(connection.status, ConnectionStatus::Disconnected);
    assert_eq!(
        connection.last_sync_error.as_deref(),
        Some(CANONICAL_AUTH_MESSAGE)
    );
}

#[tokio::test]
async fn concurrent_sync_is_rejected_by_the_lease() {
    let harness = build_harness();
    let connection_id = connected_connection(&harness);

    let lease = harness.worker.lease_handle();
    let guard = lease.acquire(&connection_id).unwrap();

    let result = harness.worker.sync_connection(&connection_id).await;
    assert!(matches!(result, Err(SyncError::AlreadyRunning)));

    drop(guard);
    assert!(harness.worker.sync_connection(&connection_id).await.is_ok());
}

#[tokio::test]
async fn password_material_is_cleared_after_otp_verification() {
    let harness = build_harness();

    let connection = harness
        .vault
        .put_credential(
            USER,
            PROVIDER,
            CredentialFields {
                display_name: "Wealthsimple".to_string(),
                username: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            "device-1".to_string(),
            "session-1".to_string(),
            "app-1".to_string(),
        )
        .unwrap();

    // Credentials are stored encrypted, never in the clear
    let stored = harness
        .connection_repository
        .get_by_id(&connection.id)
        .unwrap();
    let username_ct = stored.encrypted_username.clone().unwrap();
    assert_ne!(username_ct, b"user@example.com".to_vec());
    assert_eq!(
        harness.vault.decrypt(&username_ct).unwrap(),
        "user@example.com"
    );

    harness.vault.store_otp_claim(&connection.id, "claim-123").unwrap();
    let awaiting = harness
        .connection_repository
        .get_by_id(&connection.id)
        .unwrap();
    assert_eq!(awaiting.status, ConnectionStatus::AwaitingOtp);

    // Token persistence followed by the wipe, as the OTP verification path
    // does
    harness
        .vault
        .rotate_tokens(
            &connection.id,
            "access-token",
            "refresh-token",
            Utc::now().naive_utc() + Duration::minutes(30),
        )
        .unwrap();
    harness.vault.clear_password_material(&connection.id).unwrap();

    let cleared = harness
        .connection_repository
        .get_by_id(&connection.id)
        .unwrap();
    assert!(cleared.encrypted_username.is_none());
    assert!(cleared.encrypted_password.is_none());
    assert!(cleared.encrypted_otp_claim.is_none());
    // Re-authentication continues through the refresh token
    assert!(cleared.encrypted_refresh_token.is_some());
    assert!(cleared.token_expires_at.unwrap() > Utc::now().naive_utc());
}

#[tokio::test]
async fn reauthentication_reuses_device_identifiers() {
    let harness = build_harness();
    let connection_id = connected_connection(&harness);

    let before = harness
        .connection_repository
        .get_by_id(&connection_id)
        .unwrap();

    // A fresh login attempt for the same (user, provider) pair reuses the
    // existing row and its device identifiers
    let again = harness
        .vault
        .put_credential(
            USER,
            PROVIDER,
            CredentialFields {
                display_name: "Wealthsimple".to_string(),
                username: "user@example.com".to_string(),
                password: "new-password".to_string(),
            },
            "ignored-device".to_string(),
            "ignored-session".to_string(),
            "ignored-app".to_string(),
        )
        .unwrap();

    assert_eq!(again.id, connection_id);
    assert_eq!(again.device_id, before.device_id);
    assert_eq!(again.session_id, before.session_id);
    assert_eq!(again.app_instance_id, before.app_instance_id);
    assert_eq!(again.status, ConnectionStatus::New);
}
