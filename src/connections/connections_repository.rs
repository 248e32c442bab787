use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::db::get_connection;
use crate::schema::connections;
use crate::schema::connections::dsl::*;

use super::connections_model::{
    Connection, ConnectionDB, ConnectionStatus, NewConnection, SyncFrequency,
};
use super::sync_errors::{Result, SyncError};

/// Repository for provider connection rows
pub struct ConnectionRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl ConnectionRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<crate::db::DbConnection> {
        get_connection(&self.pool).map_err(|e| SyncError::DatabaseError(e.to_string()))
    }

    /// Inserts a fresh connection row in state `new`
    pub fn create(&self, new_connection: NewConnection) -> Result<Connection> {
        let now = chrono::Utc::now().naive_utc();
        let row = ConnectionDB {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new_connection.user_id,
            provider: new_connection.provider,
            display_name: new_connection.display_name,
            status: ConnectionStatus::New.as_str().to_string(),
            sync_frequency: SyncFrequency::Manual.as_str().to_string(),
            last_sync_at: None,
            last_sync_error: None,
            account_count: 0,
            device_id: new_connection.device_id,
            session_id: new_connection.session_id,
            app_instance_id: new_connection.app_instance_id,
            identity_id: None,
            profiles: "{}".to_string(),
            email: None,
            encrypted_access_token: None,
            encrypted_refresh_token: None,
            token_expires_at: None,
            encrypted_otp_claim: None,
            encrypted_username: Some(new_connection.encrypted_username),
            encrypted_password: Some(new_connection.encrypted_password),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn()?;
        diesel::insert_into(connections::table)
            .values(&row)
            .execute(&mut conn)?;

        Ok(row.into())
    }

    /// Stores fresh credential ciphertexts on an existing row and resets it
    /// to state `new`. Device, session and app-instance ids are kept; the
    /// provider expects them to be stable across re-authentication.
    pub fn reset_credentials(
        &self,
        connection_id: &str,
        username_ct: Vec<u8>,
        password_ct: Vec<u8>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                encrypted_username.eq(Some(username_ct)),
                encrypted_password.eq(Some(password_ct)),
                encrypted_otp_claim.eq(None::<Vec<u8>>),
                status.eq(ConnectionStatus::New.as_str()),
                last_sync_error.eq(None::<String>),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn find_by_id(&self, connection_id: &str) -> Result<Option<Connection>> {
        let mut conn = self.conn()?;
        let row = connections
            .find(connection_id)
            .first::<ConnectionDB>(&mut conn)
            .optional()?;
        Ok(row.map(Connection::from))
    }

    pub fn get_by_id(&self, connection_id: &str) -> Result<Connection> {
        self.find_by_id(connection_id)?
            .ok_or_else(|| SyncError::NotFound(connection_id.to_string()))
    }

    pub fn find_by_user_provider(
        &self,
        user_id_val: &str,
        provider_val: &str,
    ) -> Result<Option<Connection>> {
        let mut conn = self.conn()?;
        let row = connections
            .filter(user_id.eq(user_id_val))
            .filter(provider.eq(provider_val))
            .first::<ConnectionDB>(&mut conn)
            .optional()?;
        Ok(row.map(Connection::from))
    }

    pub fn list_by_user(&self, user_id_val: &str) -> Result<Vec<Connection>> {
        let mut conn = self.conn()?;
        let rows = connections
            .filter(user_id.eq(user_id_val))
            .order(created_at.asc())
            .load::<ConnectionDB>(&mut conn)?;
        Ok(rows.into_iter().map(Connection::from).collect())
    }

    /// All connections across users; scheduler input
    pub fn list_all(&self) -> Result<Vec<Connection>> {
        let mut conn = self.conn()?;
        let rows = connections
            .order(created_at.asc())
            .load::<ConnectionDB>(&mut conn)?;
        Ok(rows.into_iter().map(Connection::from).collect())
    }

    pub fn set_status(&self, connection_id: &str, new_status: ConnectionStatus) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                status.eq(new_status.as_str()),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn set_status_with_error(
        &self,
        connection_id: &str,
        new_status: ConnectionStatus,
        error_message: &str,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                status.eq(new_status.as_str()),
                last_sync_error.eq(Some(error_message.to_string())),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn store_otp_claim(&self, connection_id: &str, claim_ct: Vec<u8>) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                encrypted_otp_claim.eq(Some(claim_ct)),
                status.eq(ConnectionStatus::AwaitingOtp.as_str()),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Writes a rotated token pair and expiry in a single statement so the
    /// pair is never observed half-written.
    pub fn set_tokens(
        &self,
        connection_id: &str,
        access_ct: Vec<u8>,
        refresh_ct: Vec<u8>,
        expires_at: NaiveDateTime,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                encrypted_access_token.eq(Some(access_ct)),
                encrypted_refresh_token.eq(Some(refresh_ct)),
                token_expires_at.eq(Some(expires_at)),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Nulls the username, password and OTP-claim ciphertexts. After a
    /// successful OTP verification only the refresh token re-authenticates.
    pub fn clear_password_material(&self, connection_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                encrypted_username.eq(None::<Vec<u8>>),
                encrypted_password.eq(None::<Vec<u8>>),
                encrypted_otp_claim.eq(None::<Vec<u8>>),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Drops the token pair; used when a connection is disconnected
    pub fn clear_tokens(&self, connection_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                encrypted_access_token.eq(None::<Vec<u8>>),
                encrypted_refresh_token.eq(None::<Vec<u8>>),
                token_expires_at.eq(None::<NaiveDateTime>),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn set_identity(
        &self,
        connection_id: &str,
        identity: &str,
        profiles_map: &std::collections::HashMap<String, String>,
        email_val: Option<&str>,
    ) -> Result<()> {
        let profiles_json =
            serde_json::to_string(profiles_map).map_err(|e| SyncError::Validation(e.to_string()))?;
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                identity_id.eq(Some(identity.to_string())),
                profiles.eq(profiles_json),
                email.eq(email_val.map(|v| v.to_string())),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Rolls up a finished sync run onto the connection row
    pub fn mark_sync_complete(&self, connection_id: &str, accounts: i32) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                status.eq(ConnectionStatus::Connected.as_str()),
                account_count.eq(accounts),
                last_sync_at.eq(Some(chrono::Utc::now().naive_utc())),
                last_sync_error.eq(None::<String>),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn update_sync_frequency(
        &self,
        connection_id: &str,
        frequency: SyncFrequency,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(connections.find(connection_id))
            .set((
                sync_frequency.eq(frequency.as_str()),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Deletes the connection row; synced-account rows follow via cascade
    pub fn delete(&self, connection_id: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let affected = diesel::delete(connections.find(connection_id)).execute(&mut conn)?;
        if affected == 0 {
            return Err(SyncError::NotFound(connection_id.to_string()));
        }
        Ok(affected)
    }
}
