use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::accounts_errors::{AccountError, Result};

/// A single line of the user's balance sheet. Synced accounts are owned by
/// a provider connection; manual accounts are edited directly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub account_type: String,
    pub currency: String,
    pub institution: Option<String>,
    pub is_asset: bool,
    pub is_synced: bool,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Payload for opening an account on a user's balance sheet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub name: String,
    pub account_type: String,
    pub currency: String,
    pub institution: Option<String>,
    pub is_asset: bool,
    pub is_synced: bool,
    pub is_active: bool,
}

impl NewAccount {
    /// Rejects blank required fields before anything is written
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("currency", &self.currency),
            ("userId", &self.user_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AccountError::InvalidData(format!(
                    "Field '{}' must not be blank",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Materializes the insertable row, minting an id when the caller did
    /// not supply one
    pub(crate) fn into_row(self) -> AccountDB {
        let stamp = chrono::Utc::now().naive_utc();
        AccountDB {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: self.user_id,
            name: self.name,
            account_type: self.account_type,
            currency: self.currency,
            institution: self.institution,
            is_asset: self.is_asset,
            is_synced: self.is_synced,
            is_active: self.is_active,
            created_at: stamp,
            updated_at: stamp,
        }
    }
}

/// Row shape of the accounts table
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Clone,
)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccountDB {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub account_type: String,
    pub currency: String,
    pub institution: Option<String>,
    pub is_asset: bool,
    pub is_synced: bool,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<AccountDB> for Account {
    fn from(db: AccountDB) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            account_type: db.account_type,
            currency: db.currency,
            institution: db.institution,
            is_asset: db.is_asset,
            is_synced: db.is_synced,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewAccount {
        NewAccount {
            id: None,
            user_id: "user-1".to_string(),
            name: "Chequing".to_string(),
            account_type: "checking".to_string(),
            currency: "CAD".to_string(),
            institution: None,
            is_asset: true,
            is_synced: false,
            is_active: true,
        }
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        for mutate in [
            (|a: &mut NewAccount| a.name = "  ".to_string()) as fn(&mut NewAccount),
            |a| a.currency = String::new(),
            |a| a.user_id = String::new(),
        ] {
            let mut account = input();
            mutate(&mut account);
            assert!(matches!(
                account.validate(),
                Err(AccountError::InvalidData(_))
            ));
        }
        assert!(input().validate().is_ok());
    }

    #[test]
    fn into_row_mints_an_id_only_when_missing() {
        let minted = input().into_row();
        assert!(!minted.id.is_empty());

        let mut supplied = input();
        supplied.id = Some("fixed-id".to_string());
        assert_eq!(supplied.into_row().id, "fixed-id");
    }
}
