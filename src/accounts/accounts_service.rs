use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::debug;
use std::sync::Arc;

use super::accounts_model::{Account, NewAccount};
use super::accounts_repository::AccountRepository;
use crate::accounts::Result;

/// Account operations consumed by the sync worker and the user-facing
/// surface. Thin by design; the balance-sheet math lives in the projection
/// and tax engines.
pub struct AccountService {
    repository: AccountRepository,
}

impl AccountService {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self {
            repository: AccountRepository::new(pool),
        }
    }

    /// Opens a new account on the user's balance sheet
    pub fn create_account(&self, new_account: NewAccount) -> Result<Account> {
        debug!(
            "Opening {} account '{}' for user {}",
            new_account.account_type, new_account.name, new_account.user_id
        );
        self.repository.create(new_account)
    }

    pub fn get_account(&self, account_id: &str) -> Result<Account> {
        self.repository.get_by_id(account_id)
    }

    /// Every account belonging to a user, active or not
    pub fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        self.repository.list_for_user(user_id, None)
    }

    /// Active accounts only; the projection engine's default input set
    pub fn get_active_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        self.repository.list_for_user(user_id, Some(true))
    }

    pub fn get_accounts_by_ids(&self, account_ids: &[String]) -> Result<Vec<Account>> {
        self.repository.get_by_ids(account_ids)
    }

    /// Removes an account and, via cascade, its balances and holdings
    pub fn delete_account(&self, account_id: &str) -> Result<()> {
        self.repository.delete(account_id)
    }
}
