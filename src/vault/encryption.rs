use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{generic_array::GenericArray, Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::constants::ENV_MASTER_KEY;

use super::vault_errors::VaultError;

const NONCE_LEN: usize = 12;

/// Process-wide symmetric key, read once from the environment at startup.
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Decodes the Base64 master key from `ENC_MASTER_KEY`. A missing or
    /// malformed key is fatal at composition time.
    pub fn from_env() -> Result<Self, VaultError> {
        let raw = std::env::var(ENV_MASTER_KEY)
            .map_err(|_| VaultError::InvalidMasterKey(format!("{} is not set", ENV_MASTER_KEY)))?;
        let decoded = BASE64
            .decode(raw.trim())
            .map_err(|_| VaultError::InvalidMasterKey("key is not valid Base64".to_string()))?;
        Self::from_bytes(&decoded)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.len() != 32 {
            return Err(VaultError::InvalidMasterKey(format!(
                "key must be exactly 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(bytes);
        Ok(MasterKey(key))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

fn encrypt_bytes(plaintext: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut result = nonce_bytes.to_vec();
    result.extend(ciphertext);
    Ok(result)
}

fn decrypt_bytes(encrypted: &[u8], key: &[u8; 32]) -> Result<String> {
    if encrypted.len() < NONCE_LEN {
        return Err(anyhow!("Invalid ciphertext: too short"));
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key));

    let decrypted_bytes = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("Decryption failed: {}", e))?;

    Ok(String::from_utf8(decrypted_bytes)?)
}

/// Authenticated encryption over credential strings. Every ciphertext
/// carries its own random nonce prefix; a nonce is never reused.
pub struct Cipher {
    key: MasterKey,
}

impl Cipher {
    pub fn new(key: MasterKey) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, VaultError> {
        encrypt_bytes(plaintext.as_bytes(), &self.key.0).map_err(|_| VaultError::EncryptFailed)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<String, VaultError> {
        decrypt_bytes(ciphertext, &self.key.0).map_err(|_| VaultError::DecryptFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> Cipher {
        Cipher::new(MasterKey::from_bytes(&[7u8; 32]).unwrap())
    }

    #[test]
    fn round_trips_plaintext() {
        let cipher = test_cipher();
        let ct = cipher.encrypt("hunter2").unwrap();
        assert_eq!(cipher.decrypt(&ct).unwrap(), "hunter2");
    }

    #[test]
    fn nonces_are_unique_per_encryption() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same input").unwrap();
        let b = cipher.encrypt("same input").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = test_cipher();
        let mut ct = cipher.encrypt("secret").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(matches!(
            cipher.decrypt(&ct),
            Err(VaultError::DecryptFailed)
        ));
    }

    #[test]
    fn rejects_wrong_key() {
        let cipher = test_cipher();
        let other = Cipher::new(MasterKey::from_bytes(&[9u8; 32]).unwrap());
        let ct = cipher.encrypt("secret").unwrap();
        assert!(matches!(other.decrypt(&ct), Err(VaultError::DecryptFailed)));
    }

    #[test]
    fn master_key_requires_32_bytes() {
        assert!(MasterKey::from_bytes(&[1u8; 16]).is_err());
        assert!(MasterKey::from_bytes(&[1u8; 33]).is_err());
        assert!(MasterKey::from_bytes(&[1u8; 32]).is_ok());
    }
}
