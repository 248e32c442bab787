use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::db::get_connection;
use crate::schema::income_records;
use crate::schema::income_records::dsl::*;
use crate::tax::TaxError;

use super::income_model::{IncomeRecord, IncomeRecordDB, NewIncomeRecord};

type Result<T> = std::result::Result<T, TaxError>;

/// Repository for income records
pub struct IncomeRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl IncomeRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<crate::db::DbConnection> {
        get_connection(&self.pool).map_err(|e| TaxError::DatabaseError(e.to_string()))
    }

    pub fn create(&self, new_record: NewIncomeRecord) -> Result<IncomeRecord> {
        new_record.validate()?;

        let now = chrono::Utc::now().naive_utc();
        let row = IncomeRecordDB {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new_record.user_id,
            source: new_record.source,
            category: new_record.category.as_str().to_string(),
            amount: new_record.amount,
            currency: new_record.currency,
            frequency: new_record.frequency.as_str().to_string(),
            tax_year: new_record.tax_year,
            date_received: new_record.date_received,
            is_taxable: new_record.is_taxable,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn()?;
        diesel::insert_into(income_records::table)
            .values(&row)
            .execute(&mut conn)?;

        Ok(row.into())
    }

    pub fn get_by_id(&self, record_id: &str) -> Result<IncomeRecord> {
        let mut conn = self.conn()?;
        let row = income_records
            .find(record_id)
            .first::<IncomeRecordDB>(&mut conn)
            .optional()?
            .ok_or_else(|| TaxError::NotFound(format!("Income record {}", record_id)))?;
        Ok(row.into())
    }

    pub fn list_for_year(&self, user_id_val: &str, year: i32) -> Result<Vec<IncomeRecord>> {
        let mut conn = self.conn()?;
        let rows = income_records
            .filter(user_id.eq(user_id_val))
            .filter(tax_year.eq(year))
            .order(created_at.asc())
            .load::<IncomeRecordDB>(&mut conn)?;
        Ok(rows.into_iter().map(IncomeRecord::from).collect())
    }

    pub fn delete(&self, record_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let affected = diesel::delete(income_records.find(record_id)).execute(&mut conn)?;
        if affected == 0 {
            return Err(TaxError::NotFound(format!("Income record {}", record_id)));
        }
        Ok(())
    }
}
