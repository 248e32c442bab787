use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::accounts::{AccountError, Result};
use crate::db::get_connection;
use crate::schema::holdings;
use crate::schema::holdings::dsl::*;

use super::holdings_model::{Holding, HoldingDB, NewHolding};

/// Repository for holdings, upserted under (account_id, symbol).
/// Cash rows have no symbol, fall outside the natural key and are inserted
/// as-is.
pub struct HoldingRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl HoldingRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    /// Inserts or updates a holding. Returns the stored holding and whether
    /// an existing row was updated.
    pub fn upsert(&self, new_holding: NewHolding) -> Result<(Holding, bool)> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let now = chrono::Utc::now().naive_utc();

        let existing = match &new_holding.symbol {
            Some(symbol_val) => holdings
                .filter(account_id.eq(&new_holding.account_id))
                .filter(symbol.eq(symbol_val))
                .first::<HoldingDB>(&mut conn)
                .optional()?,
            None => None,
        };

        match existing {
            Some(mut row) => {
                row.name = new_holding.name;
                row.holding_type = new_holding.holding_type;
                row.quantity = new_holding.quantity;
                row.average_cost = new_holding.average_cost;
                row.market_value = new_holding.market_value;
                row.updated_at = now;

                diesel::update(holdings.find(&row.id))
                    .set((
                        name.eq(row.name.clone()),
                        holding_type.eq(row.holding_type.clone()),
                        quantity.eq(row.quantity),
                        average_cost.eq(row.average_cost),
                        market_value.eq(row.market_value),
                        updated_at.eq(row.updated_at),
                    ))
                    .execute(&mut conn)?;

                Ok((row.into(), true))
            }
            None => {
                let row = HoldingDB {
                    id: uuid::Uuid::new_v4().to_string(),
                    account_id: new_holding.account_id,
                    symbol: new_holding.symbol,
                    name: new_holding.name,
                    holding_type: new_holding.holding_type,
                    quantity: new_holding.quantity,
                    average_cost: new_holding.average_cost,
                    market_value: new_holding.market_value,
                    currency: new_holding.currency,
                    created_at: now,
                    updated_at: now,
                };

                diesel::insert_into(holdings::table)
                    .values(&row)
                    .execute(&mut conn)?;

                Ok((row.into(), false))
            }
        }
    }

    /// All holdings for an account
    pub fn list_for_account(&self, account_id_val: &str) -> Result<Vec<Holding>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let rows = holdings
            .filter(account_id.eq(account_id_val))
            .order(symbol.asc())
            .load::<HoldingDB>(&mut conn)?;

        Ok(rows.into_iter().map(Holding::from).collect())
    }

    /// Removes all holdings for an account
    pub fn delete_for_account(&self, account_id_val: &str) -> Result<usize> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let affected =
            diesel::delete(holdings.filter(account_id.eq(account_id_val))).execute(&mut conn)?;
        Ok(affected)
    }
}
