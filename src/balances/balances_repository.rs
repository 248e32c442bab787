use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::accounts::{AccountError, Result};
use crate::db::get_connection;
use crate::schema::balances;
use crate::schema::balances::dsl::*;

use super::balances_model::{Balance, BalanceDB, NewBalance};

/// Repository for balance observations, upserted under (account_id, day)
pub struct BalanceRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl BalanceRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    /// Inserts or updates the balance row for the observation's day.
    /// Returns the stored balance and whether an existing row was updated.
    pub fn upsert(&self, new_balance: NewBalance) -> Result<(Balance, bool)> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let day = new_balance.day_key();
        let now = chrono::Utc::now().naive_utc();

        let existing = balances
            .filter(account_id.eq(&new_balance.account_id))
            .filter(balance_date.eq(day))
            .first::<BalanceDB>(&mut conn)
            .optional()?;

        match existing {
            Some(mut row) => {
                row.amount = new_balance.amount;
                row.currency = new_balance.currency;
                row.updated_at = now;

                diesel::update(balances.find(&row.id))
                    .set((
                        amount.eq(row.amount),
                        currency.eq(row.currency.clone()),
                        updated_at.eq(row.updated_at),
                    ))
                    .execute(&mut conn)?;

                Ok((row.into(), true))
            }
            None => {
                let row = BalanceDB {
                    id: uuid::Uuid::new_v4().to_string(),
                    account_id: new_balance.account_id,
                    amount: new_balance.amount,
                    currency: new_balance.currency,
                    balance_date: day,
                    created_at: now,
                    updated_at: now,
                };

                diesel::insert_into(balances::table)
                    .values(&row)
                    .execute(&mut conn)?;

                Ok((row.into(), false))
            }
        }
    }

    /// Most recent balance for an account, if any
    pub fn latest_for_account(&self, account_id_val: &str) -> Result<Option<Balance>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let row = balances
            .filter(account_id.eq(account_id_val))
            .order(balance_date.desc())
            .first::<BalanceDB>(&mut conn)
            .optional()?;

        Ok(row.map(Balance::from))
    }

    /// Full balance history for an account, oldest first
    pub fn list_for_account(&self, account_id_val: &str) -> Result<Vec<Balance>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let rows = balances
            .filter(account_id.eq(account_id_val))
            .order(balance_date.asc())
            .load::<BalanceDB>(&mut conn)?;

        Ok(rows.into_iter().map(Balance::from).collect())
    }
}
