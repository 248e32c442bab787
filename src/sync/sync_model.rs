use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::connections::SyncError;

/// Mapping between a connection's provider account and the local account it
/// feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedAccount {
    pub id: String,
    pub connection_id: String,
    pub account_id: String,
    pub provider_account_id: String,
    pub last_sync_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSyncedAccount {
    pub connection_id: String,
    pub account_id: String,
    pub provider_account_id: String,
}

/// Database model for synced accounts
#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::synced_accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncedAccountDB {
    pub id: String,
    pub connection_id: String,
    pub account_id: String,
    pub provider_account_id: String,
    pub last_sync_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<SyncedAccountDB> for SyncedAccount {
    fn from(db: SyncedAccountDB) -> Self {
        Self {
            id: db.id,
            connection_id: db.connection_id,
            account_id: db.account_id,
            provider_account_id: db.provider_account_id,
            last_sync_at: db.last_sync_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobType {
    Accounts,
    Positions,
    Activities,
    History,
    Full,
}

impl SyncJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobType::Accounts => "accounts",
            SyncJobType::Positions => "positions",
            SyncJobType::Activities => "activities",
            SyncJobType::History => "history",
            SyncJobType::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Pending => "pending",
            SyncJobStatus::Running => "running",
            SyncJobStatus::Completed => "completed",
            SyncJobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => SyncJobStatus::Pending,
            "running" => SyncJobStatus::Running,
            "completed" => SyncJobStatus::Completed,
            _ => SyncJobStatus::Failed,
        }
    }
}

/// Per-job write counters. Counters only ever grow while a job runs, and
/// `processed = created + updated + failed` holds at completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounters {
    pub processed: i32,
    pub created: i32,
    pub updated: i32,
    pub failed: i32,
}

impl JobCounters {
    pub fn record_write(&mut self, was_update: bool) {
        self.processed += 1;
        if was_update {
            self.updated += 1;
        } else {
            self.created += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }
}

/// A per-account unit of sync work with progress counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub id: String,
    pub synced_account_id: String,
    pub job_type: SyncJobType,
    pub status: SyncJobStatus,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub counters: JobCounters,
    pub created_at: NaiveDateTime,
}

/// Database model for sync jobs
#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::sync_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncJobDB {
    pub id: String,
    pub synced_account_id: String,
    pub job_type: String,
    pub status: String,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub items_processed: i32,
    pub items_created: i32,
    pub items_updated: i32,
    pub items_failed: i32,
    pub created_at: NaiveDateTime,
}

impl From<SyncJobDB> for SyncJob {
    fn from(db: SyncJobDB) -> Self {
        let job_type = match db.job_type.as_str() {
            "accounts" => SyncJobType::Accounts,
            "positions" => SyncJobType::Positions,
            "activities" => SyncJobType::Activities,
            "history" => SyncJobType::History,
            _ => SyncJobType::Full,
        };
        Self {
            id: db.id,
            synced_account_id: db.synced_account_id,
            job_type,
            status: SyncJobStatus::parse(&db.status),
            started_at: db.started_at,
            completed_at: db.completed_at,
            error_message: db.error_message,
            counters: JobCounters {
                processed: db.items_processed,
                created: db.items_created,
                updated: db.items_updated,
                failed: db.items_failed,
            },
            created_at: db.created_at,
        }
    }
}

/// Rollup of one full sync run over a connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub accounts_synced: i32,
    pub accounts_failed: i32,
    pub items_created: i32,
    pub items_updated: i32,
}

impl SyncOutcome {
    pub fn absorb(&mut self, counters: &JobCounters, failed: bool) {
        if failed {
            self.accounts_failed += 1;
        } else {
            self.accounts_synced += 1;
        }
        self.items_created += counters.created;
        self.items_updated += counters.updated;
    }
}

/// Validation mirror of the counter invariant, used by job finalization
pub fn counters_consistent(counters: &JobCounters) -> std::result::Result<(), SyncError> {
    if counters.processed != counters.created + counters.updated + counters.failed {
        return Err(SyncError::Validation(format!(
            "Inconsistent job counters: processed {} != created {} + updated {} + failed {}",
            counters.processed, counters.created, counters.updated, counters.failed
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_balance_after_mixed_writes() {
        let mut counters = JobCounters::default();
        counters.record_write(false);
        counters.record_write(false);
        counters.record_write(true);
        counters.record_failure();

        assert_eq!(counters.processed, 4);
        assert_eq!(counters.created, 2);
        assert_eq!(counters.updated, 1);
        assert_eq!(counters.failed, 1);
        assert!(counters_consistent(&counters).is_ok());
    }

    #[test]
    fn inconsistent_counters_are_rejected() {
        let counters = JobCounters {
            processed: 5,
            created: 1,
            updated: 1,
            failed: 1,
        };
        assert!(counters_consistent(&counters).is_err());
    }
}
