use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::accounts::{AccountService, NewAccount};
use crate::balances::{BalanceRepository, NewBalance};
use crate::connections::{
    classify_sync_error, Connection, ConnectionRepository, ConnectionStatus, SyncError,
    TokenRefresher,
};
use crate::constants::{SYNC_WORKER_POOL_SIZE, WEALTHSIMPLE_INSTITUTION};
use crate::holdings::{HoldingRepository, NewHolding};
use crate::provider::{
    profile_for_account_type, AccountFinancials, ProviderAccount, ProviderError, RequestContext,
    WealthsimpleApi, PROFILE_INVEST,
};

use super::lease::SyncLease;
use super::mapping::{holding_type_for_security, local_account_type};
use super::sync_model::{JobCounters, NewSyncedAccount, SyncJobType, SyncOutcome, SyncedAccount};
use super::sync_repository::SyncRepository;

type Result<T> = std::result::Result<T, SyncError>;

/// Executes full sync runs, one connection at a time.
///
/// Per-account failures are isolated: the account's job is marked failed and
/// the loop moves on. An auth-classified failure aborts the whole run since
/// every further request would bounce too.
pub struct SyncWorker {
    connections: Arc<ConnectionRepository>,
    sync_repository: Arc<SyncRepository>,
    accounts: Arc<AccountService>,
    balances: Arc<BalanceRepository>,
    holdings: Arc<HoldingRepository>,
    api: Arc<dyn WealthsimpleApi>,
    refresher: TokenRefresher,
    lease: SyncLease,
}

impl SyncWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connections: Arc<ConnectionRepository>,
        sync_repository: Arc<SyncRepository>,
        accounts: Arc<AccountService>,
        balances: Arc<BalanceRepository>,
        holdings: Arc<HoldingRepository>,
        api: Arc<dyn WealthsimpleApi>,
        refresher: TokenRefresher,
    ) -> Self {
        Self {
            connections,
            sync_repository,
            accounts,
            balances,
            holdings,
            api,
            refresher,
            lease: SyncLease::new(),
        }
    }

    pub fn lease_handle(&self) -> SyncLease {
        self.lease.clone()
    }

    /// Runs a full sync for one connection under the per-connection lease.
    /// On failure the connection row records the classified state and
    /// message.
    pub async fn sync_connection(&self, connection_id: &str) -> Result<SyncOutcome> {
        let _guard = self
            .lease
            .acquire(connection_id)
            .ok_or(SyncError::AlreadyRunning)?;

        match self.run(connection_id).await {
            Ok(outcome) => {
                info!(
                    "Sync finished for connection {}: {} accounts ({} failed), {} created, {} updated",
                    connection_id,
                    outcome.accounts_synced,
                    outcome.accounts_failed,
                    outcome.items_created,
                    outcome.items_updated
                );
                Ok(outcome)
            }
            Err(err) => {
                let (next_state, message) = classify_sync_error(&err.to_string());
                if let Err(record_err) =
                    self.connections
                        .set_status_with_error(connection_id, next_state, &message)
                {
                    warn!(
                        "Failed to record sync error on connection {}: {}",
                        connection_id, record_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn run(&self, connection_id: &str) -> Result<SyncOutcome> {
        let connection = self.connections.get_by_id(connection_id)?;
        self.connections
            .set_status(connection_id, ConnectionStatus::Syncing)?;

        let access_token = self.refresher.fresh_access_token(&connection).await?;
        let identity_id = connection
            .identity_id
            .clone()
            .ok_or(SyncError::MissingIdentity)?;

        let session = TokenRefresher::provider_session(&connection);
        let list_ctx = RequestContext {
            session: session.clone(),
            access_token: access_token.clone(),
            profile: PROFILE_INVEST.to_string(),
        };

        let provider_accounts = self.api.list_accounts(&list_ctx, &identity_id).await?;
        let open_accounts: Vec<ProviderAccount> = provider_accounts
            .into_iter()
            .filter(|account| account.is_open())
            .collect();

        debug!(
            "Connection {}: {} open provider accounts",
            connection_id,
            open_accounts.len()
        );

        let mut outcome = SyncOutcome::default();

        for provider_account in &open_accounts {
            match self
                .sync_account(&connection, &access_token, &identity_id, provider_account)
                .await
            {
                Ok(counters) => outcome.absorb(&counters, false),
                Err(err) => {
                    let message = err.to_string();
                    if classify_sync_error(&message).0 == ConnectionStatus::Disconnected {
                        // Auth failures poison every remaining request
                        return Err(err);
                    }
                    warn!(
                        "Account {} failed to sync on connection {}: {}",
                        provider_account.id, connection_id, message
                    );
                    outcome.accounts_failed += 1;
                }
            }
        }

        self.connections
            .mark_sync_complete(connection_id, open_accounts.len() as i32)?;

        Ok(outcome)
    }

    /// Reconciles one provider account into the local ledger under a fresh
    /// sync job.
    async fn sync_account(
        &self,
        connection: &Connection,
        access_token: &str,
        identity_id: &str,
        provider_account: &ProviderAccount,
    ) -> Result<JobCounters> {
        let synced = self.reconcile_synced_account(connection, provider_account)?;

        let job = self
            .sync_repository
            .create_running_job(&synced.id, SyncJobType::Full)?;
        let mut counters = JobCounters::default();

        let result = self
            .sync_account_data(
                connection,
                access_token,
                identity_id,
                provider_account,
                &synced,
                &job.id,
                &mut counters,
            )
            .await;

        match result {
            Ok(()) => {
                self.sync_repository.complete_job(&job.id, &counters)?;
                self.sync_repository.touch_last_sync(&synced.id)?;
                Ok(counters)
            }
            Err(err) => {
                if let Err(job_err) =
                    self.sync_repository
                        .fail_job(&job.id, &counters, &err.to_string())
                {
                    warn!("Failed to finalize job {}: {}", job.id, job_err);
                }
                Err(err)
            }
        }
    }

    /// Idempotent mapping from (connection, provider account) to a local
    /// account. Creates the local account on first sight.
    fn reconcile_synced_account(
        &self,
        connection: &Connection,
        provider_account: &ProviderAccount,
    ) -> Result<SyncedAccount> {
        if let Some(existing) = self
            .sync_repository
            .find_synced_account(&connection.id, &provider_account.id)?
        {
            return Ok(existing);
        }

        let (account_type, is_asset) = local_account_type(&provider_account.account_type);
        let name = provider_account
            .nickname
            .clone()
            .unwrap_or_else(|| format!("Wealthsimple {}", account_type));

        let account = self
            .accounts
            .create_account(NewAccount {
                id: None,
                user_id: connection.user_id.clone(),
                name,
                account_type: account_type.to_string(),
                currency: provider_account.currency.clone(),
                institution: Some(WEALTHSIMPLE_INSTITUTION.to_string()),
                is_asset,
                is_synced: true,
                is_active: true,
            })
            .map_err(|e| SyncError::DatabaseError(e.to_string()))?;

        self.sync_repository.insert_synced_account(NewSyncedAccount {
            connection_id: connection.id.clone(),
            account_id: account.id,
            provider_account_id: provider_account.id.clone(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn sync_account_data(
        &self,
        connection: &Connection,
        access_token: &str,
        identity_id: &str,
        provider_account: &ProviderAccount,
        synced: &SyncedAccount,
        job_id: &str,
        counters: &mut JobCounters,
    ) -> Result<()> {
        let (_, is_asset) = local_account_type(&provider_account.account_type);
        let liability = !is_asset;

        let ctx = RequestContext {
            session: TokenRefresher::provider_session(connection),
            access_token: access_token.to_string(),
            profile: profile_for_account_type(&provider_account.account_type).to_string(),
        };

        // Credit cards live behind a different endpoint than investment
        // accounts
        let financials: AccountFinancials = if liability {
            self.api
                .fetch_credit_card_account(&ctx, &provider_account.id)
                .await?
        } else {
            self.api
                .fetch_account_financials(&ctx, std::slice::from_ref(&provider_account.id))
                .await?
                .into_iter()
                .find(|f| f.account_id == provider_account.id)
                .ok_or_else(|| {
                    SyncError::Provider(ProviderError::SchemaMismatch(
                        "FetchAccountDetails: requested account missing from response".to_string(),
                    ))
                })?
        };

        if let Some(balance_amount) = financials.balance {
            // Liabilities are stored negated so net worth sums directly
            let amount = if liability {
                -balance_amount.abs()
            } else {
                balance_amount
            };
            let currency = financials
                .currency
                .clone()
                .unwrap_or_else(|| provider_account.currency.clone());

            match self.balances.upsert(NewBalance {
                account_id: synced.account_id.clone(),
                amount,
                currency,
                balance_date: Utc::now().naive_utc(),
            }) {
                Ok((_, was_update)) => counters.record_write(was_update),
                Err(err) => {
                    warn!(
                        "Balance write failed for account {}: {}",
                        synced.account_id, err
                    );
                    counters.record_failure();
                }
            }
            self.sync_repository.update_job_counters(job_id, counters)?;
        }

        if !liability {
            let positions = self
                .api
                .fetch_positions(&ctx, identity_id, &provider_account.id, &provider_account.currency)
                .await?;

            for position in positions {
                let holding_type = holding_type_for_security(&position.security_type);
                // Only cash rows carry their own currency; securities
                // inherit the account's
                let currency = if holding_type == "cash" {
                    position.currency.clone()
                } else {
                    None
                };

                match self.holdings.upsert(NewHolding {
                    account_id: synced.account_id.clone(),
                    symbol: position.symbol.clone(),
                    name: position.name.clone(),
                    holding_type: holding_type.to_string(),
                    quantity: position.quantity,
                    average_cost: position.average_cost,
                    market_value: position.market_value,
                    currency,
                }) {
                    Ok((_, was_update)) => counters.record_write(was_update),
                    Err(err) => {
                        warn!(
                            "Holding write failed for account {} ({:?}): {}",
                            synced.account_id, position.symbol, err
                        );
                        counters.record_failure();
                    }
                }
                self.sync_repository.update_job_counters(job_id, counters)?;
            }
        }

        Ok(())
    }
}

/// Clonable submission handle onto the background worker pool.
/// Submissions are rejected while the connection's lease is held.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<String>,
    lease: SyncLease,
}

impl SyncHandle {
    pub fn submit(&self, connection_id: &str) -> Result<()> {
        if self.lease.is_held(connection_id) {
            return Err(SyncError::AlreadyRunning);
        }
        self.tx
            .send(connection_id.to_string())
            .map_err(|_| SyncError::Validation("Sync worker pool is not running".to_string()))
    }
}

/// Starts the bounded worker pool that owns background sync runs. The pool
/// size bounds concurrent provider load.
pub fn start_worker_pool(worker: Arc<SyncWorker>, pool_size: Option<usize>) -> SyncHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let lease = worker.lease_handle();
    let permits = Arc::new(Semaphore::new(pool_size.unwrap_or(SYNC_WORKER_POOL_SIZE).max(1)));

    tokio::spawn(async move {
        while let Some(connection_id) = rx.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let worker = worker.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match worker.sync_connection(&connection_id).await {
                    Ok(_) => {}
                    Err(SyncError::AlreadyRunning) => {
                        debug!("Sync already running for connection {}", connection_id);
                    }
                    Err(err) => {
                        warn!("Background sync failed for connection {}: {}", connection_id, err);
                    }
                }
            });
        }
    });

    SyncHandle { tx, lease }
}
