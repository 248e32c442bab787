use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Domain model for a position held inside an account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: String,
    pub account_id: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub holding_type: String,
    pub quantity: f64,
    pub average_cost: Option<f64>,
    pub market_value: f64,
    pub currency: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Input model for writing a holding.
/// Securities carry a symbol and inherit the account currency; cash rows
/// have no symbol and carry their own currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHolding {
    pub account_id: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub holding_type: String,
    pub quantity: f64,
    pub average_cost: Option<f64>,
    pub market_value: f64,
    pub currency: Option<String>,
}

/// Database model for holdings
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
#[diesel(table_name = crate::schema::holdings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HoldingDB {
    pub id: String,
    pub account_id: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub holding_type: String,
    pub quantity: f64,
    pub average_cost: Option<f64>,
    pub market_value: f64,
    pub currency: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<HoldingDB> for Holding {
    fn from(db: HoldingDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            symbol: db.symbol,
            name: db.name,
            holding_type: db.holding_type,
            quantity: db.quantity,
            average_cost: db.average_cost,
            market_value: db.market_value,
            currency: db.currency,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
