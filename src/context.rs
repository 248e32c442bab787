use std::sync::Arc;

use crate::accounts::AccountService;
use crate::balances::BalanceRepository;
use crate::connections::{ConnectionRepository, ConnectionService, TokenRefresher};
use crate::db::DbPool;
use crate::errors::Result;
use crate::fx::FxService;
use crate::holdings::HoldingRepository;
use crate::income::{IncomeRepository, IncomeService};
use crate::provider::{WealthsimpleApi, WealthsimpleClient};
use crate::scheduler::SyncScheduler;
use crate::sync::{start_worker_pool, SyncHandle, SyncRepository, SyncWorker};
use crate::tax::{TaxConfigRepository, TaxScenarioRepository, TaxScenarioService};
use crate::vault::{Cipher, CredentialVault, MasterKey};

/// Composition root wiring repositories, services and background machinery.
///
/// Must be built inside a tokio runtime; initialization spawns the sync
/// worker pool.
pub struct ServiceContext {
    pub pool: Arc<DbPool>,
    pub accounts: Arc<AccountService>,
    pub balances: Arc<BalanceRepository>,
    pub holdings: Arc<HoldingRepository>,
    pub fx: Arc<FxService>,
    pub vault: Arc<CredentialVault>,
    pub connections: Arc<ConnectionService>,
    pub sync_worker: Arc<SyncWorker>,
    pub sync_handle: SyncHandle,
    pub scheduler: Arc<SyncScheduler>,
    pub scenarios: Arc<TaxScenarioService>,
    pub income: Arc<IncomeService>,
    pub tax_configs: Arc<TaxConfigRepository>,
}

impl ServiceContext {
    /// Wires the full service graph over an initialized pool. The provider
    /// API is injected so hosts and tests can substitute their own client.
    pub fn init(
        pool: Arc<DbPool>,
        master_key: MasterKey,
        api: Arc<dyn WealthsimpleApi>,
    ) -> Result<Self> {
        let connection_repository = Arc::new(ConnectionRepository::new(pool.clone()));
        let sync_repository = Arc::new(SyncRepository::new(pool.clone()));

        let accounts = Arc::new(AccountService::new(pool.clone()));
        let balances = Arc::new(BalanceRepository::new(pool.clone()));
        let holdings = Arc::new(HoldingRepository::new(pool.clone()));
        let fx = Arc::new(FxService::new(pool.clone()));

        let vault = Arc::new(CredentialVault::new(
            Cipher::new(master_key),
            connection_repository.clone(),
        ));

        let refresher = TokenRefresher::new(api.clone(), vault.clone());
        let sync_worker = Arc::new(SyncWorker::new(
            connection_repository.clone(),
            sync_repository.clone(),
            accounts.clone(),
            balances.clone(),
            holdings.clone(),
            api.clone(),
            refresher,
        ));
        let sync_handle = start_worker_pool(sync_worker.clone(), None);

        let connections = Arc::new(ConnectionService::new(
            connection_repository.clone(),
            sync_repository.clone(),
            accounts.clone(),
            vault.clone(),
            api.clone(),
            sync_handle.clone(),
        ));

        let scheduler = Arc::new(SyncScheduler::new(
            connection_repository,
            sync_handle.clone(),
        ));

        let tax_configs = Arc::new(TaxConfigRepository::new(pool.clone()));
        let scenarios = Arc::new(TaxScenarioService::new(
            Arc::new(TaxScenarioRepository::new(pool.clone())),
            fx.clone(),
        ));
        let income = Arc::new(IncomeService::new(
            Arc::new(IncomeRepository::new(pool.clone())),
            tax_configs.clone(),
        ));

        Ok(Self {
            pool,
            accounts,
            balances,
            holdings,
            fx,
            vault,
            connections,
            sync_worker,
            sync_handle,
            scheduler,
            scenarios,
            income,
            tax_configs,
        })
    }

    /// Production wiring: master key from the environment, real provider
    /// client.
    pub fn from_env(pool: Arc<DbPool>) -> Result<Self> {
        let master_key = MasterKey::from_env()?;
        let api: Arc<dyn WealthsimpleApi> = Arc::new(WealthsimpleClient::new()?);
        Self::init(pool, master_key, api)
    }

    /// Starts the background scheduler loop
    pub fn start_scheduler(&self) -> tokio::task::JoinHandle<()> {
        self.scheduler.clone().start()
    }
}
