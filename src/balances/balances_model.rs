use chrono::{NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Domain model for a point-in-time account balance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub id: String,
    pub account_id: String,
    pub amount: f64,
    pub currency: String,
    pub balance_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Input model for recording a balance observation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBalance {
    pub account_id: String,
    pub amount: f64,
    pub currency: String,
    pub balance_date: NaiveDateTime,
}

impl NewBalance {
    /// Balance rows are keyed per day so a same-day re-sync updates in place
    pub fn day_key(&self) -> NaiveDateTime {
        self.balance_date
            .date()
            .and_time(NaiveTime::default())
    }
}

/// Database model for balances
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
#[diesel(table_name = crate::schema::balances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BalanceDB {
    pub id: String,
    pub account_id: String,
    pub amount: f64,
    pub currency: String,
    pub balance_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<BalanceDB> for Balance {
    fn from(db: BalanceDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            amount: db.amount,
            currency: db.currency,
            balance_date: db.balance_date,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn day_key_truncates_to_midnight() {
        let new_balance = NewBalance {
            account_id: "acct".to_string(),
            amount: 100.0,
            currency: "CAD".to_string(),
            balance_date: NaiveDate::from_ymd_opt(2025, 3, 14)
                .unwrap()
                .and_hms_opt(15, 9, 26)
                .unwrap(),
        };

        let key = new_balance.day_key();
        assert_eq!(
            key,
            NaiveDate::from_ymd_opt(2025, 3, 14)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }
}
