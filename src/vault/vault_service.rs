use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::connections::{Connection, ConnectionRepository, NewConnection};

use super::encryption::Cipher;
use super::vault_errors::VaultError;

/// Plaintext credential fields accepted at connection initiation.
/// Consumed by value; the vault stores only ciphertexts.
pub struct CredentialFields {
    pub display_name: String,
    pub username: String,
    pub password: String,
}

/// Encrypts, stores and rotates provider credential material.
///
/// Plaintext never leaves this type except through an explicit decrypt call,
/// and is never written to any log or observability surface.
pub struct CredentialVault {
    cipher: Cipher,
    repository: Arc<ConnectionRepository>,
}

impl CredentialVault {
    pub fn new(cipher: Cipher, repository: Arc<ConnectionRepository>) -> Self {
        Self { cipher, repository }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, VaultError> {
        self.cipher.encrypt(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<String, VaultError> {
        self.cipher.decrypt(ciphertext)
    }

    /// Decrypts an optional stored field
    pub fn decrypt_opt(&self, field: Option<&Vec<u8>>) -> Result<Option<String>, VaultError> {
        field.map(|ct| self.cipher.decrypt(ct)).transpose()
    }

    /// Decrypts a field that must be present
    pub fn decrypt_required(
        &self,
        field: Option<&Vec<u8>>,
        field_name: &str,
    ) -> Result<String, VaultError> {
        let ct = field.ok_or_else(|| VaultError::NotFound(field_name.to_string()))?;
        self.cipher.decrypt(ct)
    }

    /// Stores credentials for (user, provider). An existing row is reused:
    /// its device, session and app-instance ids must survive
    /// re-authentication, so only the ciphertexts and state are reset.
    pub fn put_credential(
        &self,
        user_id: &str,
        provider: &str,
        fields: CredentialFields,
        device_id: String,
        session_id: String,
        app_instance_id: String,
    ) -> Result<Connection, VaultError> {
        let username_ct = self.cipher.encrypt(&fields.username)?;
        let password_ct = self.cipher.encrypt(&fields.password)?;

        let existing = self
            .repository
            .find_by_user_provider(user_id, provider)
            .map_err(|e| VaultError::DatabaseError(e.to_string()))?;

        match existing {
            Some(connection) => {
                self.repository
                    .reset_credentials(&connection.id, username_ct, password_ct)
                    .map_err(|e| VaultError::DatabaseError(e.to_string()))?;
                self.repository
                    .get_by_id(&connection.id)
                    .map_err(|e| VaultError::DatabaseError(e.to_string()))
            }
            None => self
                .repository
                .create(NewConnection {
                    user_id: user_id.to_string(),
                    provider: provider.to_string(),
                    display_name: fields.display_name,
                    device_id,
                    session_id,
                    app_instance_id,
                    encrypted_username: username_ct,
                    encrypted_password: password_ct,
                })
                .map_err(|e| VaultError::DatabaseError(e.to_string())),
        }
    }

    pub fn get_credential(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<Connection>, VaultError> {
        self.repository
            .find_by_user_provider(user_id, provider)
            .map_err(|e| VaultError::DatabaseError(e.to_string()))
    }

    pub fn store_otp_claim(&self, connection_id: &str, claim: &str) -> Result<(), VaultError> {
        let claim_ct = self.cipher.encrypt(claim)?;
        self.repository
            .store_otp_claim(connection_id, claim_ct)
            .map_err(|e| VaultError::DatabaseError(e.to_string()))
    }

    /// Zeroes username, password and OTP-claim ciphertexts. From here on
    /// re-authentication flows only through the refresh token.
    pub fn clear_password_material(&self, connection_id: &str) -> Result<(), VaultError> {
        self.repository
            .clear_password_material(connection_id)
            .map_err(|e| VaultError::DatabaseError(e.to_string()))
    }

    /// Encrypts and persists a rotated token pair under the credential row
    pub fn rotate_tokens(
        &self,
        connection_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), VaultError> {
        let access_ct = self.cipher.encrypt(access_token)?;
        let refresh_ct = self.cipher.encrypt(refresh_token)?;
        self.repository
            .set_tokens(connection_id, access_ct, refresh_ct, expires_at)
            .map_err(|e| VaultError::DatabaseError(e.to_string()))
    }
}
