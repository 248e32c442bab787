use std::sync::Arc;

use crate::tax::{compute_tax, TaxBreakdown, TaxConfigRepository, TaxError};

use super::income_model::{IncomeCategory, IncomeRecord, NewIncomeRecord};
use super::income_repository::IncomeRepository;

type Result<T> = std::result::Result<T, TaxError>;

/// Income records plus the year-level aggregations the tax engine consumes
pub struct IncomeService {
    repository: Arc<IncomeRepository>,
    tax_configs: Arc<TaxConfigRepository>,
}

impl IncomeService {
    pub fn new(repository: Arc<IncomeRepository>, tax_configs: Arc<TaxConfigRepository>) -> Self {
        Self {
            repository,
            tax_configs,
        }
    }

    pub fn add_income(&self, new_record: NewIncomeRecord) -> Result<IncomeRecord> {
        self.repository.create(new_record)
    }

    pub fn list_income(&self, user_id: &str, tax_year: i32) -> Result<Vec<IncomeRecord>> {
        self.repository.list_for_year(user_id, tax_year)
    }

    pub fn delete_income(&self, record_id: &str) -> Result<()> {
        self.repository.delete(record_id)
    }

    /// Total taxable income for the year, recurring amounts annualized
    pub fn total_taxable_income(&self, user_id: &str, tax_year: i32) -> Result<f64> {
        let records = self.repository.list_for_year(user_id, tax_year)?;
        Ok(records
            .iter()
            .filter(|record| record.is_taxable)
            .map(IncomeRecord::annualized_amount)
            .sum())
    }

    /// Employment income only; the CPP/EI base
    pub fn employment_income(&self, user_id: &str, tax_year: i32) -> Result<f64> {
        let records = self.repository.list_for_year(user_id, tax_year)?;
        Ok(records
            .iter()
            .filter(|record| record.is_taxable && record.category == IncomeCategory::Employment)
            .map(IncomeRecord::annualized_amount)
            .sum())
    }

    /// Year-end liability estimate over the user's stored configuration
    pub fn estimate_tax(&self, user_id: &str, tax_year: i32) -> Result<TaxBreakdown> {
        let config = self.tax_configs.get_or_default(user_id, tax_year)?;
        let taxable = self.total_taxable_income(user_id, tax_year)?;
        let employment = self.employment_income(user_id, tax_year)?;
        Ok(compute_tax(&config.params, taxable, employment))
    }
}
