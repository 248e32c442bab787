mod common;

use chrono::NaiveDate;
use std::sync::Arc;

use moneta_core::fx::{FxService, NewExchangeRate};
use moneta_core::tax::{
    NewSimulatedExercise, NewSimulatedSale, ScenarioContext, TaxError, TaxScenarioRepository,
    TaxScenarioService,
};

fn day(year: i32, month: u32, dayofmonth: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, dayofmonth).unwrap()
}

fn service(pool: Arc<moneta_core::db::DbPool>) -> TaxScenarioService {
    TaxScenarioService::new(
        Arc::new(TaxScenarioRepository::new(pool.clone())),
        Arc::new(FxService::new(pool)),
    )
}

fn exercise_input(grant: &str, quantity: f64, currency: &str) -> NewSimulatedExercise {
    NewSimulatedExercise {
        grant_id: grant.to_string(),
        date: day(2025, 6, 15),
        quantity,
        strike_price: 2.0,
        fmv_at_exercise: 10.0,
        currency: currency.to_string(),
    }
}

#[test]
fn scenario_lifecycle_and_summary_persistence() {
    let (_dir, pool) = common::test_pool();
    let service = service(pool);
    let ctx = ScenarioContext::new("CAD", 0.5);

    let scenario = service.create_scenario("user-1", "Exercise this year").unwrap();
    assert!(scenario.summary.is_none());

    let updated = service
        .add_exercise(&scenario.id, exercise_input("grant-1", 1_000.0, "CAD"), &ctx)
        .unwrap();

    let summary = updated.summary.expect("summary recomputed after mutation");
    // 1,000 x ($10 - $2) benefit, half deducted, taxed at 50%
    assert!((summary.total_tax - 2_000.0).abs() < 1e-9);

    // The summary survives a round-trip through storage
    let reloaded = service.get_scenario(&scenario.id).unwrap();
    let stored = reloaded.summary.expect("summary persisted");
    assert!((stored.total_tax - 2_000.0).abs() < 1e-9);

    // Clone keeps the events, rename changes only the label
    let copy = service.clone_scenario(&scenario.id, "Copy").unwrap();
    assert_eq!(copy.exercises.len(), 1);
    let renamed = service.rename_scenario(&copy.id, "Exercise next year").unwrap();
    assert_eq!(renamed.name, "Exercise next year");

    service.delete_scenario(&copy.id).unwrap();
    assert!(matches!(
        service.get_scenario(&copy.id),
        Err(TaxError::NotFound(_))
    ));
}

#[test]
fn sales_draw_from_simulated_lots() {
    let (_dir, pool) = common::test_pool();
    let service = service(pool);
    let ctx = ScenarioContext::new("CAD", 0.5);

    let scenario = service.create_scenario("user-1", "Sell half").unwrap();
    let with_exercise = service
        .add_exercise(&scenario.id, exercise_input("grant-1", 1_000.0, "CAD"), &ctx)
        .unwrap();
    let lot_id = with_exercise.exercises[0].id.clone();

    let sale = NewSimulatedSale {
        grant_id: "grant-1".to_string(),
        lot_id: Some(lot_id.clone()),
        date: day(2025, 9, 1),
        quantity: 600.0,
        sale_price: 15.0,
        cost_basis: 10.0,
        acquisition_date: day(2025, 6, 15),
        currency: "CAD".to_string(),
    };
    let with_sale = service.add_sale(&scenario.id, sale.clone(), &ctx).unwrap();
    assert_eq!(with_sale.sales.len(), 1);

    // The remaining 400 shares bound any further sale from this lot
    let mut too_many = sale;
    too_many.quantity = 500.0;
    let err = service.add_sale(&scenario.id, too_many, &ctx).unwrap_err();
    assert!(matches!(err, TaxError::ExceedsAvailableQuantity { .. }));

    // Deleting the lot is blocked while the sale references it
    assert!(service.delete_exercise(&scenario.id, &lot_id, &ctx).is_err());
}

#[test]
fn cross_currency_summary_converts_through_the_rate_table() {
    let (_dir, pool) = common::test_pool();
    let fx = FxService::new(pool.clone());
    fx.add_rate(NewExchangeRate {
        from_currency: "USD".to_string(),
        to_currency: "CAD".to_string(),
        rate: 1.35,
        rate_date: day(2025, 1, 1),
    })
    .unwrap();

    let service = service(pool);
    let ctx = ScenarioContext::new("CAD", 0.5);

    let scenario = service.create_scenario("user-1", "Cross-border").unwrap();
    service
        .add_exercise(&scenario.id, exercise_input("grant-cad", 1_000.0, "CAD"), &ctx)
        .unwrap();
    let updated = service
        .add_exercise(&scenario.id, exercise_input("grant-usd", 1_000.0, "USD"), &ctx)
        .unwrap();

    let summary = updated.summary.unwrap();
    // CAD bucket taxes 2,000 natively; the USD bucket converts at 1.35
    assert!((summary.total_tax - (2_000.0 + 2_000.0 * 1.35)).abs() < 1e-6);
    assert!((summary.by_currency["USD"].exercise_tax - 2_000.0).abs() < 1e-9);
}

#[test]
fn comparison_identifies_the_cheapest_scenario() {
    let (_dir, pool) = common::test_pool();
    let service = service(pool);
    let ctx = ScenarioContext::new("CAD", 0.5);

    let small = service.create_scenario("user-1", "Small exercise").unwrap();
    service
        .add_exercise(&small.id, exercise_input("grant-1", 100.0, "CAD"), &ctx)
        .unwrap();

    let large = service.create_scenario("user-1", "Large exercise").unwrap();
    service
        .add_exercise(&large.id, exercise_input("grant-1", 1_000.0, "CAD"), &ctx)
        .unwrap();

    let comparison = service.compare_scenarios("user-1", &ctx).unwrap();
    assert_eq!(comparison.best_scenario_id, small.id);
    assert_eq!(comparison.entries.len(), 2);
    assert_eq!(comparison.entries[0].savings_vs_best, 0.0);
    // The larger exercise pays 1,800 more (2,000 vs 200)
    assert!((comparison.entries[1].savings_vs_best - 1_800.0).abs() < 1e-9);
}
