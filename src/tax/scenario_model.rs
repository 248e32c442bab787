use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::tax_errors::{Result, TaxError};

/// A hypothetical option exercise inside a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedExercise {
    pub id: String,
    pub grant_id: String,
    pub date: NaiveDate,
    pub quantity: f64,
    pub strike_price: f64,
    pub fmv_at_exercise: f64,
    pub currency: String,
}

/// A hypothetical sale drawing shares from a lot. `lot_id` points at a
/// simulated exercise in the same scenario; without it the sale draws from
/// the grant's actual exercised shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedSale {
    pub id: String,
    pub grant_id: String,
    #[serde(default)]
    pub lot_id: Option<String>,
    pub date: NaiveDate,
    pub quantity: f64,
    pub sale_price: f64,
    pub cost_basis: f64,
    pub acquisition_date: NaiveDate,
    pub currency: String,
}

/// Input model for appending an exercise to a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSimulatedExercise {
    pub grant_id: String,
    pub date: NaiveDate,
    pub quantity: f64,
    pub strike_price: f64,
    pub fmv_at_exercise: f64,
    pub currency: String,
}

impl NewSimulatedExercise {
    pub(crate) fn into_exercise(self) -> SimulatedExercise {
        SimulatedExercise {
            id: uuid::Uuid::new_v4().to_string(),
            grant_id: self.grant_id,
            date: self.date,
            quantity: self.quantity,
            strike_price: self.strike_price,
            fmv_at_exercise: self.fmv_at_exercise,
            currency: self.currency,
        }
    }
}

/// Input model for appending a sale to a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSimulatedSale {
    pub grant_id: String,
    #[serde(default)]
    pub lot_id: Option<String>,
    pub date: NaiveDate,
    pub quantity: f64,
    pub sale_price: f64,
    pub cost_basis: f64,
    pub acquisition_date: NaiveDate,
    pub currency: String,
}

impl NewSimulatedSale {
    pub(crate) fn into_sale(self) -> SimulatedSale {
        SimulatedSale {
            id: uuid::Uuid::new_v4().to_string(),
            grant_id: self.grant_id,
            lot_id: self.lot_id,
            date: self.date,
            quantity: self.quantity,
            sale_price: self.sale_price,
            cost_basis: self.cost_basis,
            acquisition_date: self.acquisition_date,
            currency: self.currency,
        }
    }
}

/// Aggregates for one (year, currency) bucket, in the bucket's native
/// currency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearCurrencyBucket {
    pub year: i32,
    pub currency: String,
    pub taxable_benefit: f64,
    pub stock_option_deduction: f64,
    pub capital_gains: f64,
    pub exercise_tax: f64,
    pub sale_tax: f64,
    pub total_tax: f64,
}

/// Aggregates after conversion into one currency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearTotals {
    pub taxable_benefit: f64,
    pub stock_option_deduction: f64,
    pub capital_gains: f64,
    pub exercise_tax: f64,
    pub sale_tax: f64,
    pub total_tax: f64,
}

impl YearTotals {
    pub(crate) fn absorb_scaled(&mut self, bucket: &YearCurrencyBucket, rate: f64) {
        self.taxable_benefit += bucket.taxable_benefit * rate;
        self.stock_option_deduction += bucket.stock_option_deduction * rate;
        self.capital_gains += bucket.capital_gains * rate;
        self.exercise_tax += bucket.exercise_tax * rate;
        self.sale_tax += bucket.sale_tax * rate;
        self.total_tax += bucket.total_tax * rate;
    }
}

/// Derived scenario summary. Per-currency subtotals are converted to the
/// reporting currency and only then summed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub reporting_currency: String,
    pub buckets: Vec<YearCurrencyBucket>,
    pub by_year: BTreeMap<i32, YearTotals>,
    pub by_currency: BTreeMap<String, YearTotals>,
    pub total_tax: f64,
}

/// A named what-if composition of exercises and sales
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxScenario {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub exercises: Vec<SimulatedExercise>,
    pub sales: Vec<SimulatedSale>,
    pub summary: Option<ScenarioSummary>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TaxScenario {
    /// Shares still available to sell from a simulated exercise lot
    pub fn available_in_lot(&self, lot_id: &str, excluding_sale: Option<&str>) -> f64 {
        let exercised: f64 = self
            .exercises
            .iter()
            .filter(|exercise| exercise.id == lot_id)
            .map(|exercise| exercise.quantity)
            .sum();
        let sold: f64 = self
            .sales
            .iter()
            .filter(|sale| sale.lot_id.as_deref() == Some(lot_id))
            .filter(|sale| excluding_sale != Some(sale.id.as_str()))
            .map(|sale| sale.quantity)
            .sum();
        exercised - sold
    }

    /// Total simulated exercised quantity for a grant
    pub fn exercised_for_grant(&self, grant_id: &str, excluding_exercise: Option<&str>) -> f64 {
        self.exercises
            .iter()
            .filter(|exercise| exercise.grant_id == grant_id)
            .filter(|exercise| excluding_exercise != Some(exercise.id.as_str()))
            .map(|exercise| exercise.quantity)
            .sum()
    }

    /// Simulated sales drawing directly from the grant's actual lots
    pub fn sold_from_actual(&self, grant_id: &str, excluding_sale: Option<&str>) -> f64 {
        self.sales
            .iter()
            .filter(|sale| sale.grant_id == grant_id && sale.lot_id.is_none())
            .filter(|sale| excluding_sale != Some(sale.id.as_str()))
            .map(|sale| sale.quantity)
            .sum()
    }
}

/// External facts the simulator validates against and converts with
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub reporting_currency: String,
    /// Marginal rate applied to option benefits and capital gains
    pub marginal_rate: f64,
    /// Vested-plus-projected-vested quantity per grant; exercises beyond
    /// this are rejected when the grant is known
    pub vested_by_grant: BTreeMap<String, f64>,
    /// Actually-exercised quantity per grant, available to direct sales
    pub actual_exercised_by_grant: BTreeMap<String, f64>,
}

impl ScenarioContext {
    pub fn new(reporting_currency: &str, marginal_rate: f64) -> Self {
        Self {
            reporting_currency: reporting_currency.to_string(),
            marginal_rate,
            vested_by_grant: BTreeMap::new(),
            actual_exercised_by_grant: BTreeMap::new(),
        }
    }
}

/// Result of ranking scenarios by converted total tax
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub best_scenario_id: String,
    pub entries: Vec<ComparisonEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonEntry {
    pub scenario_id: String,
    pub name: String,
    pub total_tax: f64,
    /// How much more this scenario pays than the best one
    pub savings_vs_best: f64,
}

/// Database model for scenarios; events ride as JSON
#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::tax_scenarios)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaxScenarioDB {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub exercises: String,
    pub sales: String,
    pub summary: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<TaxScenarioDB> for TaxScenario {
    type Error = TaxError;

    fn try_from(db: TaxScenarioDB) -> Result<Self> {
        let exercises: Vec<SimulatedExercise> = serde_json::from_str(&db.exercises)
            .map_err(|e| TaxError::InvalidInput(format!("Corrupt scenario exercises: {}", e)))?;
        let sales: Vec<SimulatedSale> = serde_json::from_str(&db.sales)
            .map_err(|e| TaxError::InvalidInput(format!("Corrupt scenario sales: {}", e)))?;
        let summary = db
            .summary
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .unwrap_or_default();

        Ok(Self {
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            exercises,
            sales,
            summary,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

impl TaxScenario {
    pub(crate) fn to_db(&self) -> Result<TaxScenarioDB> {
        Ok(TaxScenarioDB {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            exercises: serde_json::to_string(&self.exercises)
                .map_err(|e| TaxError::InvalidInput(e.to_string()))?,
            sales: serde_json::to_string(&self.sales)
                .map_err(|e| TaxError::InvalidInput(e.to_string()))?,
            summary: self
                .summary
                .as_ref()
                .map(|summary| serde_json::to_string(summary))
                .transpose()
                .map_err(|e| TaxError::InvalidInput(e.to_string()))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
