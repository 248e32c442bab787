use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::db::get_connection;
use crate::schema::tax_scenarios;
use crate::schema::tax_scenarios::dsl::*;

use super::scenario_model::{TaxScenario, TaxScenarioDB};
use super::tax_errors::{Result, TaxError};

/// Repository for persisted what-if scenarios
pub struct TaxScenarioRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl TaxScenarioRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<crate::db::DbConnection> {
        get_connection(&self.pool).map_err(|e| TaxError::DatabaseError(e.to_string()))
    }

    pub fn insert(&self, scenario: &TaxScenario) -> Result<()> {
        let row = scenario.to_db()?;
        let mut conn = self.conn()?;
        diesel::insert_into(tax_scenarios::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn save(&self, scenario: &TaxScenario) -> Result<()> {
        let row = scenario.to_db()?;
        let mut conn = self.conn()?;
        diesel::update(tax_scenarios.find(&row.id))
            .set(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get(&self, scenario_id: &str) -> Result<TaxScenario> {
        let mut conn = self.conn()?;
        let row = tax_scenarios
            .find(scenario_id)
            .first::<TaxScenarioDB>(&mut conn)
            .optional()?
            .ok_or_else(|| TaxError::NotFound(format!("Scenario {}", scenario_id)))?;
        TaxScenario::try_from(row)
    }

    pub fn list_for_user(&self, user_id_val: &str) -> Result<Vec<TaxScenario>> {
        let mut conn = self.conn()?;
        let rows = tax_scenarios
            .filter(user_id.eq(user_id_val))
            .order(created_at.asc())
            .load::<TaxScenarioDB>(&mut conn)?;
        rows.into_iter().map(TaxScenario::try_from).collect()
    }

    pub fn delete(&self, scenario_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let affected = diesel::delete(tax_scenarios.find(scenario_id)).execute(&mut conn)?;
        if affected == 0 {
            return Err(TaxError::NotFound(format!("Scenario {}", scenario_id)));
        }
        Ok(())
    }
}
