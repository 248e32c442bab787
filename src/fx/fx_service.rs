use chrono::NaiveDate;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;

use super::fx_errors::FxError;
use super::fx_model::{ExchangeRate, NewExchangeRate};
use super::fx_repository::FxRepository;

/// Point-in-time currency conversion over the stored rate table.
///
/// Lookups are keyed by an explicit as-of date; the greatest-dated rate at
/// or before that date wins. A missing rate is an error, never a silent
/// zero.
pub struct FxService {
    repository: FxRepository,
}

impl FxService {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>) -> Self {
        Self {
            repository: FxRepository::new(pool),
        }
    }

    /// Returns the conversion rate from `from` to `to` as of the given date
    pub fn rate_on(&self, from: &str, to: &str, as_of: NaiveDate) -> Result<f64, FxError> {
        if from == to {
            return Ok(1.0);
        }

        match self.repository.rate_on(from, to, as_of)? {
            Some(found) => Ok(found.rate),
            None => Err(FxError::NoRateAvailable {
                from: from.to_string(),
                to: to.to_string(),
                as_of,
            }),
        }
    }

    /// Converts an amount between currencies as of the given date
    pub fn convert(
        &self,
        amount: f64,
        from: &str,
        to: &str,
        as_of: NaiveDate,
    ) -> Result<f64, FxError> {
        if from == to {
            return Ok(amount);
        }
        let found = self.rate_on(from, to, as_of)?;
        Ok(amount * found)
    }

    pub fn add_rate(&self, new_rate: NewExchangeRate) -> Result<ExchangeRate, FxError> {
        self.repository.upsert_rate(new_rate)
    }

    pub fn get_rates(&self) -> Result<Vec<ExchangeRate>, FxError> {
        self.repository.list_rates()
    }

    pub fn delete_rate(&self, rate_id: &str) -> Result<(), FxError> {
        self.repository.delete_rate(rate_id)
    }
}
