/// Profile header value for registered and credit accounts
pub const PROFILE_INVEST: &str = "invest";

/// Profile header value for cash and brokerage accounts
pub const PROFILE_TRADE: &str = "trade";

/// Picks the provider profile namespace an account's queries must run under.
/// Registered and credit products live under `invest`; self-directed cash
/// and brokerage accounts under `trade`.
pub fn profile_for_account_type(provider_account_type: &str) -> &'static str {
    match provider_account_type {
        "ca_cash_msb" | "ca_cash" | "cash" | "non_registered" => PROFILE_TRADE,
        _ => PROFILE_INVEST,
    }
}

pub const LIST_ACCOUNTS_OPERATION: &str = "ListAccounts";

pub const LIST_ACCOUNTS_QUERY: &str = r#"
query ListAccounts($identityId: ID!) {
  identity(id: $identityId) {
    accounts(first: 100) {
      edges {
        node {
          id
          unifiedAccountType
          status
          currency
          nickname
        }
      }
    }
  }
}
"#;

pub const FETCH_ACCOUNT_DETAILS_OPERATION: &str = "FetchAccountDetails";

pub const FETCH_ACCOUNT_DETAILS_QUERY: &str = r#"
query FetchAccountDetails($ids: [String!]!) {
  accounts(ids: $ids) {
    id
    financials {
      currentCombined {
        netLiquidationValueV2 {
          amount
          currency
        }
      }
    }
  }
}
"#;

pub const FETCH_ACCOUNT_POSITIONS_OPERATION: &str = "FetchAccountPositions";

pub const FETCH_ACCOUNT_POSITIONS_QUERY: &str = r#"
query FetchAccountPositions($identityId: ID!, $currency: Currency!, $accountIds: [String!], $first: Int!) {
  identity(id: $identityId) {
    positions(currency: $currency, accountIds: $accountIds, first: $first) {
      edges {
        node {
          security {
            symbol
            name
            type
          }
          quantity
          averageCost {
            amount
            currency
          }
          totalValue {
            amount
            currency
          }
          type
        }
      }
    }
  }
}
"#;

pub const FETCH_CREDIT_CARD_ACCOUNT_OPERATION: &str = "FetchCreditCardAccount";

pub const FETCH_CREDIT_CARD_ACCOUNT_QUERY: &str = r#"
query FetchCreditCardAccount($id: ID!) {
  creditCardAccount(id: $id) {
    id
    financials {
      currentBalance {
        amount
        currency
      }
    }
  }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_products_use_invest_profile() {
        assert_eq!(profile_for_account_type("tfsa"), PROFILE_INVEST);
        assert_eq!(profile_for_account_type("rrsp"), PROFILE_INVEST);
        assert_eq!(profile_for_account_type("ca_credit_card"), PROFILE_INVEST);
    }

    #[test]
    fn cash_and_brokerage_use_trade_profile() {
        assert_eq!(profile_for_account_type("ca_cash"), PROFILE_TRADE);
        assert_eq!(profile_for_account_type("cash"), PROFILE_TRADE);
        assert_eq!(profile_for_account_type("non_registered"), PROFILE_TRADE);
    }

    #[test]
    fn unknown_types_default_to_invest() {
        assert_eq!(profile_for_account_type("mystery"), PROFILE_INVEST);
    }
}
