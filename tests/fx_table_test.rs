mod common;

use chrono::NaiveDate;

use moneta_core::fx::{FxError, FxService, NewExchangeRate};

fn day(year: i32, month: u32, dayofmonth: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, dayofmonth).unwrap()
}

fn rate(from: &str, to: &str, value: f64, on: NaiveDate) -> NewExchangeRate {
    NewExchangeRate {
        from_currency: from.to_string(),
        to_currency: to.to_string(),
        rate: value,
        rate_date: on,
    }
}

#[test]
fn lookup_returns_greatest_dated_rate_at_or_before_asof() {
    let (_dir, pool) = common::test_pool();
    let fx = FxService::new(pool.clone());

    fx.add_rate(rate("USD", "CAD", 1.30, day(2025, 1, 1))).unwrap();
    fx.add_rate(rate("USD", "CAD", 1.35, day(2025, 3, 1))).unwrap();
    fx.add_rate(rate("USD", "CAD", 1.40, day(2025, 6, 1))).unwrap();

    // Exact date
    assert_eq!(fx.rate_on("USD", "CAD", day(2025, 3, 1)).unwrap(), 1.35);
    // Between rates: the most recent earlier one wins
    assert_eq!(fx.rate_on("USD", "CAD", day(2025, 5, 15)).unwrap(), 1.35);
    // After the last rate
    assert_eq!(fx.rate_on("USD", "CAD", day(2026, 1, 1)).unwrap(), 1.40);
}

#[test]
fn identity_conversion_needs_no_table() {
    let (_dir, pool) = common::test_pool();
    let fx = FxService::new(pool.clone());

    assert_eq!(fx.rate_on("CAD", "CAD", day(2025, 1, 1)).unwrap(), 1.0);
    assert_eq!(fx.convert(250.0, "CAD", "CAD", day(2025, 1, 1)).unwrap(), 250.0);
}

#[test]
fn missing_rate_is_an_error_never_zero() {
    let (_dir, pool) = common::test_pool();
    let fx = FxService::new(pool.clone());

    fx.add_rate(rate("USD", "CAD", 1.35, day(2025, 3, 1))).unwrap();

    // Before the earliest stored date
    let err = fx.rate_on("USD", "CAD", day(2024, 12, 31)).unwrap_err();
    assert!(matches!(err, FxError::NoRateAvailable { .. }));

    // Unknown pair
    let err = fx.rate_on("EUR", "CAD", day(2025, 6, 1)).unwrap_err();
    assert!(matches!(err, FxError::NoRateAvailable { .. }));
}

#[test]
fn same_day_rate_updates_in_place() {
    let (_dir, pool) = common::test_pool();
    let fx = FxService::new(pool.clone());

    fx.add_rate(rate("USD", "CAD", 1.30, day(2025, 1, 1))).unwrap();
    fx.add_rate(rate("USD", "CAD", 1.31, day(2025, 1, 1))).unwrap();

    assert_eq!(fx.rate_on("USD", "CAD", day(2025, 1, 1)).unwrap(), 1.31);
    assert_eq!(fx.get_rates().unwrap().len(), 1);
}

#[test]
fn conversion_multiplies_by_the_dated_rate() {
    let (_dir, pool) = common::test_pool();
    let fx = FxService::new(pool.clone());

    fx.add_rate(rate("USD", "CAD", 1.25, day(2025, 1, 1))).unwrap();
    let converted = fx.convert(100.0, "USD", "CAD", day(2025, 2, 1)).unwrap();
    assert_eq!(converted, 125.0);
}
