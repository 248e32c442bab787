use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::connections::SyncError;
use crate::db::get_connection;
use crate::schema::{sync_jobs, synced_accounts};

use super::sync_model::{
    counters_consistent, JobCounters, NewSyncedAccount, SyncJob, SyncJobDB, SyncJobStatus,
    SyncJobType, SyncedAccount, SyncedAccountDB,
};

type Result<T> = std::result::Result<T, SyncError>;

/// Repository over synced-account mappings and their sync jobs
pub struct SyncRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl SyncRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<crate::db::DbConnection> {
        get_connection(&self.pool).map_err(|e| SyncError::DatabaseError(e.to_string()))
    }

    /// Looks up the mapping for (connection, provider account), if present
    pub fn find_synced_account(
        &self,
        connection_id_val: &str,
        provider_account_id_val: &str,
    ) -> Result<Option<SyncedAccount>> {
        use crate::schema::synced_accounts::dsl::*;

        let mut conn = self.conn()?;
        let row = synced_accounts
            .filter(connection_id.eq(connection_id_val))
            .filter(provider_account_id.eq(provider_account_id_val))
            .first::<SyncedAccountDB>(&mut conn)
            .optional()?;
        Ok(row.map(SyncedAccount::from))
    }

    /// Inserts a new mapping; unique on (connection, provider account)
    pub fn insert_synced_account(&self, new: NewSyncedAccount) -> Result<SyncedAccount> {
        let row = SyncedAccountDB {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: new.connection_id,
            account_id: new.account_id,
            provider_account_id: new.provider_account_id,
            last_sync_at: None,
            created_at: Utc::now().naive_utc(),
        };

        let mut conn = self.conn()?;
        diesel::insert_into(synced_accounts::table)
            .values(&row)
            .execute(&mut conn)?;

        Ok(row.into())
    }

    pub fn list_by_connection(&self, connection_id_val: &str) -> Result<Vec<SyncedAccount>> {
        use crate::schema::synced_accounts::dsl::*;

        let mut conn = self.conn()?;
        let rows = synced_accounts
            .filter(connection_id.eq(connection_id_val))
            .order(created_at.asc())
            .load::<SyncedAccountDB>(&mut conn)?;
        Ok(rows.into_iter().map(SyncedAccount::from).collect())
    }

    pub fn touch_last_sync(&self, synced_account_id_val: &str) -> Result<()> {
        use crate::schema::synced_accounts::dsl::*;

        let mut conn = self.conn()?;
        diesel::update(synced_accounts.find(synced_account_id_val))
            .set(last_sync_at.eq(Some(Utc::now().naive_utc())))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Opens a running job for a synced account
    pub fn create_running_job(
        &self,
        synced_account_id_val: &str,
        job_type_val: SyncJobType,
    ) -> Result<SyncJob> {
        let now = Utc::now().naive_utc();
        let row = SyncJobDB {
            id: uuid::Uuid::new_v4().to_string(),
            synced_account_id: synced_account_id_val.to_string(),
            job_type: job_type_val.as_str().to_string(),
            status: SyncJobStatus::Running.as_str().to_string(),
            started_at: Some(now),
            completed_at: None,
            error_message: None,
            items_processed: 0,
            items_created: 0,
            items_updated: 0,
            items_failed: 0,
            created_at: now,
        };

        let mut conn = self.conn()?;
        diesel::insert_into(sync_jobs::table)
            .values(&row)
            .execute(&mut conn)?;

        Ok(row.into())
    }

    /// Writes current counters onto a running job
    pub fn update_job_counters(&self, job_id: &str, counters: &JobCounters) -> Result<()> {
        use crate::schema::sync_jobs::dsl::*;

        let mut conn = self.conn()?;
        diesel::update(sync_jobs.find(job_id))
            .set((
                items_processed.eq(counters.processed),
                items_created.eq(counters.created),
                items_updated.eq(counters.updated),
                items_failed.eq(counters.failed),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Finalizes a job as completed with its counters
    pub fn complete_job(&self, job_id: &str, counters: &JobCounters) -> Result<()> {
        use crate::schema::sync_jobs::dsl::*;

        counters_consistent(counters)?;

        let mut conn = self.conn()?;
        diesel::update(sync_jobs.find(job_id))
            .set((
                status.eq(SyncJobStatus::Completed.as_str()),
                completed_at.eq(Some(Utc::now().naive_utc())),
                items_processed.eq(counters.processed),
                items_created.eq(counters.created),
                items_updated.eq(counters.updated),
                items_failed.eq(counters.failed),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Finalizes a job as failed, keeping whatever progress was committed
    pub fn fail_job(&self, job_id: &str, counters: &JobCounters, message: &str) -> Result<()> {
        use crate::schema::sync_jobs::dsl::*;

        let mut conn = self.conn()?;
        diesel::update(sync_jobs.find(job_id))
            .set((
                status.eq(SyncJobStatus::Failed.as_str()),
                completed_at.eq(Some(Utc::now().naive_utc())),
                error_message.eq(Some(message.to_string())),
                items_processed.eq(counters.processed),
                items_created.eq(counters.created),
                items_updated.eq(counters.updated),
                items_failed.eq(counters.failed),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<SyncJob>> {
        use crate::schema::sync_jobs::dsl::*;

        let mut conn = self.conn()?;
        let row = sync_jobs
            .find(job_id)
            .first::<SyncJobDB>(&mut conn)
            .optional()?;
        Ok(row.map(SyncJob::from))
    }

    /// Jobs for all of a connection's synced accounts, newest first
    pub fn list_jobs_for_connection(&self, connection_id_val: &str) -> Result<Vec<SyncJob>> {
        use crate::schema::synced_accounts::dsl as sa;

        let mut conn = self.conn()?;
        let rows = sync_jobs::table
            .inner_join(synced_accounts::table)
            .filter(sa::connection_id.eq(connection_id_val))
            .order(sync_jobs::created_at.desc())
            .select(SyncJobDB::as_select())
            .load::<SyncJobDB>(&mut conn)?;
        Ok(rows.into_iter().map(SyncJob::from).collect())
    }
}
