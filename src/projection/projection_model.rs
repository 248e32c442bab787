use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::errors::{Error, Result, ValidationError};
use crate::tax::TaxBracket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionEventType {
    OneTimeIncome,
    OneTimeExpense,
    ExtraDebtPayment,
    SalaryChange,
    ExpenseLevelChange,
    SavingsRateChange,
}

impl ProjectionEventType {
    /// Total order of event application within a month. Insertion order of
    /// the event list never matters.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            ProjectionEventType::OneTimeIncome => 0,
            ProjectionEventType::SalaryChange
            | ProjectionEventType::ExpenseLevelChange
            | ProjectionEventType::SavingsRateChange => 1,
            ProjectionEventType::ExtraDebtPayment => 2,
            ProjectionEventType::OneTimeExpense => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseChangeType {
    Absolute,
    RelativeAmount,
    RelativePercent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    Monthly,
    Quarterly,
    Annually,
}

impl RecurrenceFrequency {
    pub(crate) fn months(&self) -> u32 {
        match self {
            RecurrenceFrequency::Monthly => 1,
            RecurrenceFrequency::Quarterly => 3,
            RecurrenceFrequency::Annually => 12,
        }
    }
}

/// A dated life event feeding the projection. Parameters are
/// type-dependent; unrelated fields stay `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionEvent {
    pub id: String,
    pub date: NaiveDate,
    pub event_type: ProjectionEventType,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub new_salary: Option<f64>,
    #[serde(default)]
    pub new_salary_growth: Option<f64>,
    #[serde(default)]
    pub new_expenses: Option<f64>,
    #[serde(default)]
    pub expense_change: Option<f64>,
    #[serde(default)]
    pub expense_change_type: Option<ExpenseChangeType>,
    #[serde(default)]
    pub new_savings_rate: Option<f64>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurrence_frequency: Option<RecurrenceFrequency>,
    #[serde(default)]
    pub recurrence_end_date: Option<NaiveDate>,
}

impl ProjectionEvent {
    pub fn one_time(
        id: &str,
        date: NaiveDate,
        event_type: ProjectionEventType,
        amount: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            date,
            event_type,
            amount: Some(amount),
            new_salary: None,
            new_salary_growth: None,
            new_expenses: None,
            expense_change: None,
            expense_change_type: None,
            new_savings_rate: None,
            account_id: None,
            is_recurring: false,
            recurrence_frequency: None,
            recurrence_end_date: None,
        }
    }
}

/// Full projection input. The config owns its events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionConfig {
    /// First simulated month (month 0)
    pub start_date: NaiveDate,
    pub time_horizon_years: u32,
    pub inflation_rate: f64,
    pub annual_salary: f64,
    pub annual_salary_growth: f64,
    pub federal_tax_brackets: Vec<TaxBracket>,
    pub provincial_tax_brackets: Vec<TaxBracket>,
    pub monthly_expenses: f64,
    pub annual_expense_growth: f64,
    pub monthly_savings_rate: f64,
    #[serde(default)]
    pub investment_returns: HashMap<String, f64>,
    #[serde(default)]
    pub asset_appreciation: HashMap<String, f64>,
    #[serde(default)]
    pub extra_debt_payments: HashMap<String, f64>,
    #[serde(default)]
    pub savings_allocation: HashMap<String, f64>,
    #[serde(default)]
    pub events: Vec<ProjectionEvent>,
}

impl ProjectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.time_horizon_years > 100 {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Time horizon cannot exceed 100 years".to_string(),
            )));
        }
        if !(0.0..=1.0).contains(&self.monthly_savings_rate) {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Savings rate must be between 0 and 1".to_string(),
            )));
        }

        let mut allocation_total = 0.0;
        for (account_id, fraction) in &self.savings_allocation {
            if !(0.0..=1.0).contains(fraction) {
                return Err(Error::Validation(ValidationError::InvalidInput(format!(
                    "Savings allocation for {} must be between 0 and 1",
                    account_id
                ))));
            }
            allocation_total += fraction;
        }
        if allocation_total > 1.0 + 1e-9 {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Savings allocation fractions cannot sum above 1".to_string(),
            )));
        }

        for value in [
            self.annual_salary,
            self.annual_salary_growth,
            self.monthly_expenses,
            self.annual_expense_growth,
            self.inflation_rate,
        ] {
            if !value.is_finite() {
                return Err(Error::Validation(ValidationError::InvalidInput(
                    "Projection inputs must be finite numbers".to_string(),
                )));
            }
        }

        Ok(())
    }
}

/// Amortization inputs for one debt account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtSchedule {
    pub account_id: String,
    pub balance: f64,
    pub annual_rate: f64,
    pub scheduled_payment: f64,
}

/// Current ledger state the projection starts from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionLedger {
    #[serde(default)]
    pub investment_balances: HashMap<String, f64>,
    #[serde(default)]
    pub asset_values: HashMap<String, f64>,
    #[serde(default)]
    pub debts: Vec<DebtSchedule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlow {
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
}

/// One emitted month of the projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRow {
    pub month: u32,
    pub date: NaiveDate,
    pub net_worth: f64,
    pub assets: f64,
    pub liabilities: f64,
    pub cash_flow: CashFlow,
    pub asset_breakdown: BTreeMap<String, f64>,
    pub debt_payoff: BTreeMap<String, f64>,
    pub total_debt: f64,
}
