use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::accounts::{AccountError, Result};
use crate::db::get_connection;
use crate::schema::accounts;
use crate::schema::accounts::dsl::*;

use super::accounts_model::{Account, AccountDB, NewAccount};

/// Persistence for balance-sheet accounts. Every read path is scoped to a
/// user except direct id lookups, which the sync worker performs on rows it
/// created itself.
pub struct AccountRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl AccountRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<crate::db::DbConnection> {
        get_connection(&self.pool).map_err(|e| AccountError::DatabaseError(e.to_string()))
    }

    /// Validates and writes a new account, returning the stored state
    pub fn create(&self, new_account: NewAccount) -> Result<Account> {
        new_account.validate()?;
        let row = new_account.into_row();

        let mut conn = self.conn()?;
        diesel::insert_into(accounts::table)
            .values(&row)
            .execute(&mut conn)?;

        Ok(row.into())
    }

    /// Fetches one account by id
    pub fn get_by_id(&self, account_id: &str) -> Result<Account> {
        let mut conn = self.conn()?;

        let found = accounts
            .find(account_id)
            .first::<AccountDB>(&mut conn)
            .optional()?;

        found.map(Account::from).ok_or_else(|| {
            AccountError::NotFound(format!("No account exists under id {}", account_id))
        })
    }

    /// Lists accounts for a user, optionally filtering by active status
    pub fn list_for_user(
        &self,
        user_id_filter: &str,
        is_active_filter: Option<bool>,
    ) -> Result<Vec<Account>> {
        let mut conn = self.conn()?;

        let mut query = accounts::table
            .filter(user_id.eq(user_id_filter))
            .into_boxed();

        if let Some(active) = is_active_filter {
            query = query.filter(is_active.eq(active));
        }

        let rows = query
            .order((is_active.desc(), name.asc()))
            .load::<AccountDB>(&mut conn)?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    /// Batch lookup used when a projection references specific accounts
    pub fn get_by_ids(&self, account_ids: &[String]) -> Result<Vec<Account>> {
        let mut conn = self.conn()?;

        let rows = accounts
            .filter(id.eq_any(account_ids))
            .load::<AccountDB>(&mut conn)?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    /// Removes an account. Its balance and holding rows go with it through
    /// the foreign-key cascade; a missing id is reported, not ignored.
    pub fn delete(&self, account_id: &str) -> Result<()> {
        let mut conn = self.conn()?;

        match diesel::delete(accounts.find(account_id)).execute(&mut conn)? {
            0 => Err(AccountError::NotFound(format!(
                "No account exists under id {}",
                account_id
            ))),
            _ => Ok(()),
        }
    }
}
