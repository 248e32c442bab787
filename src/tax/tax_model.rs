use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::tax_errors::{Result, TaxError};

/// One progressive bracket. `up_to_income = 0` is the sentinel for the
/// unbounded top bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    pub up_to_income: f64,
    pub rate: f64,
}

/// Where a configuration field came from: the published rate API or a
/// manual override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Api,
    Manual,
}

/// Numeric inputs of a year's tax computation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxParameters {
    pub federal_brackets: Vec<TaxBracket>,
    pub provincial_brackets: Vec<TaxBracket>,
    pub cpp_rate: f64,
    pub cpp_max_pensionable: f64,
    pub cpp_basic_exemption: f64,
    pub ei_rate: f64,
    pub ei_max_insurable: f64,
    pub basic_personal_amount: f64,
}

impl TaxParameters {
    /// Published 2024 figures for a British Columbia resident; used as the
    /// seed configuration until the user edits or the rate API refreshes it.
    pub fn canada_bc_2024() -> Self {
        Self {
            federal_brackets: vec![
                TaxBracket { up_to_income: 55_867.0, rate: 0.15 },
                TaxBracket { up_to_income: 111_733.0, rate: 0.205 },
                TaxBracket { up_to_income: 173_205.0, rate: 0.26 },
                TaxBracket { up_to_income: 246_752.0, rate: 0.29 },
                TaxBracket { up_to_income: 0.0, rate: 0.33 },
            ],
            provincial_brackets: vec![
                TaxBracket { up_to_income: 47_937.0, rate: 0.0506 },
                TaxBracket { up_to_income: 95_875.0, rate: 0.077 },
                TaxBracket { up_to_income: 110_076.0, rate: 0.105 },
                TaxBracket { up_to_income: 133_664.0, rate: 0.1229 },
                TaxBracket { up_to_income: 181_232.0, rate: 0.147 },
                TaxBracket { up_to_income: 252_752.0, rate: 0.168 },
                TaxBracket { up_to_income: 0.0, rate: 0.205 },
            ],
            cpp_rate: 0.0595,
            cpp_max_pensionable: 68_500.0,
            cpp_basic_exemption: 3_500.0,
            ei_rate: 0.0166,
            ei_max_insurable: 63_200.0,
            basic_personal_amount: 15_705.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for brackets in [&self.federal_brackets, &self.provincial_brackets] {
            let mut previous = 0.0;
            for (index, bracket) in brackets.iter().enumerate() {
                if bracket.rate < 0.0 || bracket.rate > 1.0 {
                    return Err(TaxError::InvalidInput(format!(
                        "Bracket rate {} out of range",
                        bracket.rate
                    )));
                }
                let unlimited = bracket.up_to_income == 0.0;
                if unlimited && index != brackets.len() - 1 {
                    return Err(TaxError::InvalidInput(
                        "Unlimited bracket must come last".to_string(),
                    ));
                }
                if !unlimited && bracket.up_to_income <= previous {
                    return Err(TaxError::InvalidInput(
                        "Bracket thresholds must be strictly increasing".to_string(),
                    ));
                }
                if !unlimited {
                    previous = bracket.up_to_income;
                }
            }
        }
        Ok(())
    }
}

/// A user's persisted tax configuration for one year
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxConfiguration {
    pub id: String,
    pub user_id: String,
    pub tax_year: i32,
    pub region: String,
    pub params: TaxParameters,
    pub field_sources: HashMap<String, FieldSource>,
}

/// Database model for tax configurations; bracket lists ride as JSON
#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::tax_configurations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaxConfigurationDB {
    pub id: String,
    pub user_id: String,
    pub tax_year: i32,
    pub region: String,
    pub federal_brackets: String,
    pub provincial_brackets: String,
    pub cpp_rate: f64,
    pub cpp_max_pensionable: f64,
    pub cpp_basic_exemption: f64,
    pub ei_rate: f64,
    pub ei_max_insurable: f64,
    pub basic_personal_amount: f64,
    pub field_sources: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<TaxConfigurationDB> for TaxConfiguration {
    type Error = TaxError;

    fn try_from(db: TaxConfigurationDB) -> Result<Self> {
        let federal_brackets: Vec<TaxBracket> = serde_json::from_str(&db.federal_brackets)
            .map_err(|e| TaxError::InvalidInput(format!("Corrupt federal brackets: {}", e)))?;
        let provincial_brackets: Vec<TaxBracket> = serde_json::from_str(&db.provincial_brackets)
            .map_err(|e| TaxError::InvalidInput(format!("Corrupt provincial brackets: {}", e)))?;
        let field_sources: HashMap<String, FieldSource> =
            serde_json::from_str(&db.field_sources).unwrap_or_default();

        Ok(Self {
            id: db.id,
            user_id: db.user_id,
            tax_year: db.tax_year,
            region: db.region,
            params: TaxParameters {
                federal_brackets,
                provincial_brackets,
                cpp_rate: db.cpp_rate,
                cpp_max_pensionable: db.cpp_max_pensionable,
                cpp_basic_exemption: db.cpp_basic_exemption,
                ei_rate: db.ei_rate,
                ei_max_insurable: db.ei_max_insurable,
                basic_personal_amount: db.basic_personal_amount,
            },
            field_sources,
        })
    }
}
