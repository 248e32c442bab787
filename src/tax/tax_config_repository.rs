use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::get_connection;
use crate::schema::tax_configurations;
use crate::schema::tax_configurations::dsl::*;

use super::tax_errors::{Result, TaxError};
use super::tax_model::{FieldSource, TaxConfiguration, TaxConfigurationDB, TaxParameters};

/// Repository for per-user, per-year tax configurations
pub struct TaxConfigRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl TaxConfigRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<crate::db::DbConnection> {
        get_connection(&self.pool).map_err(|e| TaxError::DatabaseError(e.to_string()))
    }

    /// Fetches a user's configuration for a year, if stored
    pub fn find(&self, user_id_val: &str, year: i32) -> Result<Option<TaxConfiguration>> {
        let mut conn = self.conn()?;
        let row = tax_configurations
            .filter(user_id.eq(user_id_val))
            .filter(tax_year.eq(year))
            .first::<TaxConfigurationDB>(&mut conn)
            .optional()?;
        row.map(TaxConfiguration::try_from).transpose()
    }

    /// The configuration used for computations: the stored one, or the
    /// published defaults
    pub fn get_or_default(&self, user_id_val: &str, year: i32) -> Result<TaxConfiguration> {
        if let Some(found) = self.find(user_id_val, year)? {
            return Ok(found);
        }
        Ok(TaxConfiguration {
            id: String::new(),
            user_id: user_id_val.to_string(),
            tax_year: year,
            region: "BC".to_string(),
            params: TaxParameters::canada_bc_2024(),
            field_sources: HashMap::new(),
        })
    }

    /// Creates or replaces the configuration for (user, year)
    pub fn upsert(
        &self,
        user_id_val: &str,
        year: i32,
        region_val: &str,
        params: &TaxParameters,
        sources: &HashMap<String, FieldSource>,
    ) -> Result<TaxConfiguration> {
        params.validate()?;

        let now = chrono::Utc::now().naive_utc();
        let federal_json = serde_json::to_string(&params.federal_brackets)
            .map_err(|e| TaxError::InvalidInput(e.to_string()))?;
        let provincial_json = serde_json::to_string(&params.provincial_brackets)
            .map_err(|e| TaxError::InvalidInput(e.to_string()))?;
        let sources_json =
            serde_json::to_string(sources).map_err(|e| TaxError::InvalidInput(e.to_string()))?;

        let mut conn = self.conn()?;

        let existing = tax_configurations
            .filter(user_id.eq(user_id_val))
            .filter(tax_year.eq(year))
            .first::<TaxConfigurationDB>(&mut conn)
            .optional()?;

        let row = match existing {
            Some(mut row) => {
                row.region = region_val.to_string();
                row.federal_brackets = federal_json;
                row.provincial_brackets = provincial_json;
                row.cpp_rate = params.cpp_rate;
                row.cpp_max_pensionable = params.cpp_max_pensionable;
                row.cpp_basic_exemption = params.cpp_basic_exemption;
                row.ei_rate = params.ei_rate;
                row.ei_max_insurable = params.ei_max_insurable;
                row.basic_personal_amount = params.basic_personal_amount;
                row.field_sources = sources_json;
                row.updated_at = now;

                diesel::update(tax_configurations.find(&row.id))
                    .set(&row)
                    .execute(&mut conn)?;
                row
            }
            None => {
                let row = TaxConfigurationDB {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user_id_val.to_string(),
                    tax_year: year,
                    region: region_val.to_string(),
                    federal_brackets: federal_json,
                    provincial_brackets: provincial_json,
                    cpp_rate: params.cpp_rate,
                    cpp_max_pensionable: params.cpp_max_pensionable,
                    cpp_basic_exemption: params.cpp_basic_exemption,
                    ei_rate: params.ei_rate,
                    ei_max_insurable: params.ei_max_insurable,
                    basic_personal_amount: params.basic_personal_amount,
                    field_sources: sources_json,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(tax_configurations::table)
                    .values(&row)
                    .execute(&mut conn)?;
                row
            }
        };

        TaxConfiguration::try_from(row)
    }

    pub fn delete(&self, config_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::delete(tax_configurations.find(config_id)).execute(&mut conn)?;
        Ok(())
    }
}
