pub(crate) mod encryption;
pub(crate) mod vault_errors;
pub(crate) mod vault_service;

pub use encryption::{Cipher, MasterKey};
pub use vault_errors::VaultError;
pub use vault_service::{CredentialFields, CredentialVault};
