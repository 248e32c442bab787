use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::db::get_connection;
use crate::schema::exchange_rates;
use crate::schema::exchange_rates::dsl::*;

use super::fx_errors::FxError;
use super::fx_model::{ExchangeRate, ExchangeRateDB, NewExchangeRate};

/// Repository for the dated exchange-rate table
pub struct FxRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl FxRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    /// Inserts or replaces the rate for (from, to, date)
    pub fn upsert_rate(&self, new_rate: NewExchangeRate) -> Result<ExchangeRate, FxError> {
        new_rate.validate()?;

        let mut conn = get_connection(&self.pool).map_err(|e| FxError::DatabaseError(e.to_string()))?;

        let existing = exchange_rates
            .filter(from_currency.eq(&new_rate.from_currency))
            .filter(to_currency.eq(&new_rate.to_currency))
            .filter(rate_date.eq(new_rate.rate_date))
            .first::<ExchangeRateDB>(&mut conn)
            .optional()?;

        match existing {
            Some(mut row) => {
                row.rate = new_rate.rate;
                diesel::update(exchange_rates.find(&row.id))
                    .set(rate.eq(row.rate))
                    .execute(&mut conn)?;
                Ok(row.into())
            }
            None => {
                let row = ExchangeRateDB {
                    id: uuid::Uuid::new_v4().to_string(),
                    from_currency: new_rate.from_currency,
                    to_currency: new_rate.to_currency,
                    rate: new_rate.rate,
                    rate_date: new_rate.rate_date,
                    created_at: chrono::Utc::now().naive_utc(),
                };
                diesel::insert_into(exchange_rates::table)
                    .values(&row)
                    .execute(&mut conn)?;
                Ok(row.into())
            }
        }
    }

    /// The greatest-dated rate at or before `as_of` for the pair, if any
    pub fn rate_on(
        &self,
        from: &str,
        to: &str,
        as_of: NaiveDate,
    ) -> Result<Option<ExchangeRate>, FxError> {
        let mut conn = get_connection(&self.pool).map_err(|e| FxError::DatabaseError(e.to_string()))?;

        let row = exchange_rates
            .filter(from_currency.eq(from))
            .filter(to_currency.eq(to))
            .filter(rate_date.le(as_of))
            .order(rate_date.desc())
            .first::<ExchangeRateDB>(&mut conn)
            .optional()?;

        Ok(row.map(ExchangeRate::from))
    }

    /// All stored rates, newest first
    pub fn list_rates(&self) -> Result<Vec<ExchangeRate>, FxError> {
        let mut conn = get_connection(&self.pool).map_err(|e| FxError::DatabaseError(e.to_string()))?;

        let rows = exchange_rates
            .order((from_currency.asc(), to_currency.asc(), rate_date.desc()))
            .load::<ExchangeRateDB>(&mut conn)?;

        Ok(rows.into_iter().map(ExchangeRate::from).collect())
    }

    /// Deletes a stored rate by its ID
    pub fn delete_rate(&self, rate_id: &str) -> Result<(), FxError> {
        let mut conn = get_connection(&self.pool).map_err(|e| FxError::DatabaseError(e.to_string()))?;

        diesel::delete(exchange_rates.find(rate_id)).execute(&mut conn)?;
        Ok(())
    }
}
