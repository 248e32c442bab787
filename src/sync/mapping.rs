/// Maps a provider account type to the local account type and whether the
/// account sits on the asset side of the balance sheet.
pub fn local_account_type(provider_account_type: &str) -> (&'static str, bool) {
    match provider_account_type {
        "tfsa" => ("tfsa", true),
        "rrsp" => ("rrsp", true),
        "ca_rrif" | "fhsa" | "ca_resp" => ("other", true),
        "non_registered" => ("brokerage", true),
        "ca_cash_msb" | "ca_cash" | "cash" => ("checking", true),
        "ca_credit_card" => ("credit_card", false),
        "crypto" => ("crypto", true),
        _ => ("brokerage", true),
    }
}

/// Maps a provider security type to the local holding type
pub fn holding_type_for_security(security_type: &str) -> &'static str {
    match security_type {
        "equity" | "stock" => "stock",
        "etf" | "exchange_traded_fund" => "etf",
        "mutual_fund" => "mutual_fund",
        "bond" | "fixed_income" => "bond",
        "crypto" | "cryptocurrency" => "crypto",
        "option" => "option",
        "cash" => "cash",
        _ => "other",
    }
}
