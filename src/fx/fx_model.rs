use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::fx_errors::FxError;

/// A dated exchange rate between two currencies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub id: String,
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub rate_date: NaiveDate,
}

impl ExchangeRate {
    pub fn make_fx_symbol(from: &str, to: &str) -> String {
        format!("{}{}=X", from, to)
    }
}

/// Input model for recording an exchange rate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExchangeRate {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub rate_date: NaiveDate,
}

impl NewExchangeRate {
    pub fn validate(&self) -> Result<(), FxError> {
        if self.from_currency.trim().len() != 3 {
            return Err(FxError::InvalidCurrencyCode(self.from_currency.clone()));
        }
        if self.to_currency.trim().len() != 3 {
            return Err(FxError::InvalidCurrencyCode(self.to_currency.clone()));
        }
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(FxError::InvalidRate(format!("{}", self.rate)));
        }
        Ok(())
    }
}

/// Database model for exchange rates
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Clone,
)]
#[diesel(table_name = crate::schema::exchange_rates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ExchangeRateDB {
    pub id: String,
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub rate_date: NaiveDate,
    pub created_at: NaiveDateTime,
}

impl From<ExchangeRateDB> for ExchangeRate {
    fn from(db: ExchangeRateDB) -> Self {
        Self {
            id: db.id,
            from_currency: db.from_currency,
            to_currency: db.to_currency,
            rate: db.rate,
            rate_date: db.rate_date,
        }
    }
}
