use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::sync_errors::SyncError;

/// Lifecycle states of a provider connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    New,
    AwaitingOtp,
    Syncing,
    Connected,
    Error,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::New => "new",
            ConnectionStatus::AwaitingOtp => "awaiting_otp",
            ConnectionStatus::Syncing => "syncing",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "new" => ConnectionStatus::New,
            "awaiting_otp" => ConnectionStatus::AwaitingOtp,
            "syncing" => ConnectionStatus::Syncing,
            "connected" => ConnectionStatus::Connected,
            "disconnected" => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Error,
        }
    }
}

/// How often the scheduler re-syncs a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFrequency {
    Manual,
    Hourly,
    Daily,
}

impl SyncFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncFrequency::Manual => "manual",
            SyncFrequency::Hourly => "hourly",
            SyncFrequency::Daily => "daily",
        }
    }

    pub fn parse(value: &str) -> Result<Self, SyncError> {
        match value {
            "manual" => Ok(SyncFrequency::Manual),
            "hourly" => Ok(SyncFrequency::Hourly),
            "daily" => Ok(SyncFrequency::Daily),
            other => Err(SyncError::Validation(format!(
                "Unknown sync frequency: {}",
                other
            ))),
        }
    }
}

/// Domain model for a provider connection. Credential material stays
/// encrypted; only the vault can read it.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub display_name: String,
    pub status: ConnectionStatus,
    pub sync_frequency: SyncFrequency,
    pub last_sync_at: Option<NaiveDateTime>,
    pub last_sync_error: Option<String>,
    pub account_count: i32,
    pub device_id: String,
    pub session_id: String,
    pub app_instance_id: String,
    pub identity_id: Option<String>,
    pub profiles: HashMap<String, String>,
    pub email: Option<String>,
    pub encrypted_access_token: Option<Vec<u8>>,
    pub encrypted_refresh_token: Option<Vec<u8>>,
    pub token_expires_at: Option<NaiveDateTime>,
    pub encrypted_otp_claim: Option<Vec<u8>>,
    pub encrypted_username: Option<Vec<u8>>,
    pub encrypted_password: Option<Vec<u8>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Secret-free view of a connection for listing endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: String,
    pub provider: String,
    pub display_name: String,
    pub status: ConnectionStatus,
    pub sync_frequency: SyncFrequency,
    pub last_sync_at: Option<NaiveDateTime>,
    pub last_sync_error: Option<String>,
    pub account_count: i32,
    pub email: Option<String>,
}

impl From<&Connection> for ConnectionSummary {
    fn from(connection: &Connection) -> Self {
        Self {
            id: connection.id.clone(),
            provider: connection.provider.clone(),
            display_name: connection.display_name.clone(),
            status: connection.status,
            sync_frequency: connection.sync_frequency,
            last_sync_at: connection.last_sync_at,
            last_sync_error: connection.last_sync_error.clone(),
            account_count: connection.account_count,
            email: connection.email.clone(),
        }
    }
}

/// Input model for creating a connection row at initiation time
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_id: String,
    pub provider: String,
    pub display_name: String,
    pub device_id: String,
    pub session_id: String,
    pub app_instance_id: String,
    pub encrypted_username: Vec<u8>,
    pub encrypted_password: Vec<u8>,
}

/// Database model for connections
#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::connections)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConnectionDB {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub display_name: String,
    pub status: String,
    pub sync_frequency: String,
    pub last_sync_at: Option<NaiveDateTime>,
    pub last_sync_error: Option<String>,
    pub account_count: i32,
    pub device_id: String,
    pub session_id: String,
    pub app_instance_id: String,
    pub identity_id: Option<String>,
    pub profiles: String,
    pub email: Option<String>,
    pub encrypted_access_token: Option<Vec<u8>>,
    pub encrypted_refresh_token: Option<Vec<u8>>,
    pub token_expires_at: Option<NaiveDateTime>,
    pub encrypted_otp_claim: Option<Vec<u8>>,
    pub encrypted_username: Option<Vec<u8>>,
    pub encrypted_password: Option<Vec<u8>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<ConnectionDB> for Connection {
    fn from(db: ConnectionDB) -> Self {
        let profiles = serde_json::from_str(&db.profiles).unwrap_or_default();
        Self {
            id: db.id,
            user_id: db.user_id,
            provider: db.provider,
            display_name: db.display_name,
            status: ConnectionStatus::parse(&db.status),
            sync_frequency: SyncFrequency::parse(&db.sync_frequency)
                .unwrap_or(SyncFrequency::Manual),
            last_sync_at: db.last_sync_at,
            last_sync_error: db.last_sync_error,
            account_count: db.account_count,
            device_id: db.device_id,
            session_id: db.session_id,
            app_instance_id: db.app_instance_id,
            identity_id: db.identity_id,
            profiles,
            email: db.email,
            encrypted_access_token: db.encrypted_access_token,
            encrypted_refresh_token: db.encrypted_refresh_token,
            token_expires_at: db.token_expires_at,
            encrypted_otp_claim: db.encrypted_otp_claim,
            encrypted_username: db.encrypted_username,
            encrypted_password: db.encrypted_password,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
