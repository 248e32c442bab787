use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::tax::TaxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeCategory {
    Employment,
    Investment,
    Rental,
    Business,
    Other,
}

impl IncomeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeCategory::Employment => "employment",
            IncomeCategory::Investment => "investment",
            IncomeCategory::Rental => "rental",
            IncomeCategory::Business => "business",
            IncomeCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "employment" => IncomeCategory::Employment,
            "investment" => IncomeCategory::Investment,
            "rental" => IncomeCategory::Rental,
            "business" => IncomeCategory::Business,
            _ => IncomeCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeFrequency {
    OneTime,
    BiWeekly,
    Monthly,
    Annually,
}

impl IncomeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeFrequency::OneTime => "one_time",
            IncomeFrequency::BiWeekly => "bi_weekly",
            IncomeFrequency::Monthly => "monthly",
            IncomeFrequency::Annually => "annually",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "bi_weekly" => IncomeFrequency::BiWeekly,
            "monthly" => IncomeFrequency::Monthly,
            "annually" => IncomeFrequency::Annually,
            _ => IncomeFrequency::OneTime,
        }
    }

    /// Occurrences per tax year used to annualize a recurring amount
    pub fn annual_factor(&self) -> f64 {
        match self {
            IncomeFrequency::OneTime => 1.0,
            IncomeFrequency::BiWeekly => 26.0,
            IncomeFrequency::Monthly => 12.0,
            IncomeFrequency::Annually => 1.0,
        }
    }
}

/// A recorded income source for one tax year
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeRecord {
    pub id: String,
    pub user_id: String,
    pub source: String,
    pub category: IncomeCategory,
    pub amount: f64,
    pub currency: String,
    pub frequency: IncomeFrequency,
    pub tax_year: i32,
    pub date_received: Option<NaiveDate>,
    pub is_taxable: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl IncomeRecord {
    /// The record's contribution to the year's income
    pub fn annualized_amount(&self) -> f64 {
        self.amount * self.frequency.annual_factor()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncomeRecord {
    pub user_id: String,
    pub source: String,
    pub category: IncomeCategory,
    pub amount: f64,
    pub currency: String,
    pub frequency: IncomeFrequency,
    pub tax_year: i32,
    pub date_received: Option<NaiveDate>,
    pub is_taxable: bool,
}

impl NewIncomeRecord {
    pub fn validate(&self) -> Result<(), TaxError> {
        if self.source.trim().is_empty() {
            return Err(TaxError::InvalidInput(
                "Income source cannot be empty".to_string(),
            ));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(TaxError::InvalidInput(
                "Income amount must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Database model for income records
#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::income_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IncomeRecordDB {
    pub id: String,
    pub user_id: String,
    pub source: String,
    pub category: String,
    pub amount: f64,
    pub currency: String,
    pub frequency: String,
    pub tax_year: i32,
    pub date_received: Option<NaiveDate>,
    pub is_taxable: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<IncomeRecordDB> for IncomeRecord {
    fn from(db: IncomeRecordDB) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            source: db.source,
            category: IncomeCategory::parse(&db.category),
            amount: db.amount,
            currency: db.currency,
            frequency: IncomeFrequency::parse(&db.frequency),
            tax_year: db.tax_year,
            date_received: db.date_received,
            is_taxable: db.is_taxable,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annualization_factors() {
        assert_eq!(IncomeFrequency::OneTime.annual_factor(), 1.0);
        assert_eq!(IncomeFrequency::BiWeekly.annual_factor(), 26.0);
        assert_eq!(IncomeFrequency::Monthly.annual_factor(), 12.0);
        assert_eq!(IncomeFrequency::Annually.annual_factor(), 1.0);
    }
}
