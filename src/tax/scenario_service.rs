use chrono::{Datelike, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::fx::FxService;

use super::scenario_model::{
    ComparisonEntry, NewSimulatedExercise, NewSimulatedSale, ScenarioComparison, ScenarioContext,
    ScenarioSummary, SimulatedExercise, SimulatedSale, TaxScenario, YearCurrencyBucket, YearTotals,
};
use super::scenario_repository::TaxScenarioRepository;
use super::tax_calculator::{capital_gain_tax, option_benefit};
use super::tax_errors::{Result, TaxError};

/// What-if simulator over option exercises and sales.
///
/// Every mutation re-derives the scenario summary: events are grouped by
/// year and currency, taxed at the context's marginal rate, and per-currency
/// subtotals are converted to the reporting currency before any cross-
/// currency sum.
pub struct TaxScenarioService {
    repository: Arc<TaxScenarioRepository>,
    fx: Arc<FxService>,
}

fn validate_positive_quantity(quantity: f64) -> Result<()> {
    if quantity <= 0.0 || !quantity.is_finite() {
        return Err(TaxError::InvalidInput(
            "Quantity must be a positive number".to_string(),
        ));
    }
    Ok(())
}

/// Rejects an exercise exceeding the grant's vested-plus-projected quantity
fn validate_exercise(
    scenario: &TaxScenario,
    exercise: &SimulatedExercise,
    excluding: Option<&str>,
    ctx: &ScenarioContext,
) -> Result<()> {
    validate_positive_quantity(exercise.quantity)?;

    if let Some(vested) = ctx.vested_by_grant.get(&exercise.grant_id) {
        let already = scenario.exercised_for_grant(&exercise.grant_id, excluding);
        if already + exercise.quantity > *vested + 1e-9 {
            return Err(TaxError::ExceedsAvailableQuantity {
                grant_id: exercise.grant_id.clone(),
                requested: exercise.quantity,
                available: vested - already,
            });
        }
    }
    Ok(())
}

/// Rejects a sale drawing more shares than its lot has left
fn validate_sale(
    scenario: &TaxScenario,
    sale: &SimulatedSale,
    excluding: Option<&str>,
    ctx: &ScenarioContext,
) -> Result<()> {
    validate_positive_quantity(sale.quantity)?;

    match &sale.lot_id {
        Some(lot_id) => {
            if !scenario.exercises.iter().any(|e| &e.id == lot_id) {
                return Err(TaxError::NotFound(format!(
                    "Exercise lot {} in scenario {}",
                    lot_id, scenario.id
                )));
            }
            let available = scenario.available_in_lot(lot_id, excluding);
            if sale.quantity > available + 1e-9 {
                return Err(TaxError::ExceedsAvailableQuantity {
                    grant_id: sale.grant_id.clone(),
                    requested: sale.quantity,
                    available,
                });
            }
        }
        None => {
            let exercised_actual = ctx
                .actual_exercised_by_grant
                .get(&sale.grant_id)
                .copied()
                .unwrap_or(0.0);
            let already_sold = scenario.sold_from_actual(&sale.grant_id, excluding);
            let available = exercised_actual - already_sold;
            if sale.quantity > available + 1e-9 {
                return Err(TaxError::ExceedsAvailableQuantity {
                    grant_id: sale.grant_id.clone(),
                    requested: sale.quantity,
                    available,
                });
            }
        }
    }
    Ok(())
}

/// Derives the summary from scratch. `rate_for` resolves a currency's
/// conversion into the reporting currency as of a year-end date.
fn build_summary(
    scenario: &TaxScenario,
    ctx: &ScenarioContext,
    rate_for: &dyn Fn(&str, NaiveDate) -> Result<f64>,
) -> Result<ScenarioSummary> {
    let mut buckets: BTreeMap<(i32, String), YearCurrencyBucket> = BTreeMap::new();

    for exercise in &scenario.exercises {
        let year = exercise.date.year();
        let benefit = option_benefit(
            exercise.quantity,
            exercise.strike_price,
            exercise.fmv_at_exercise,
            true,
        );
        let tax = benefit.net_taxable * ctx.marginal_rate;

        let bucket = buckets
            .entry((year, exercise.currency.clone()))
            .or_insert_with(|| YearCurrencyBucket {
                year,
                currency: exercise.currency.clone(),
                ..Default::default()
            });
        bucket.taxable_benefit += benefit.taxable_benefit;
        bucket.stock_option_deduction += benefit.deduction;
        bucket.exercise_tax += tax;
        bucket.total_tax += tax;
    }

    for sale in &scenario.sales {
        let year = sale.date.year();
        let gain = sale.quantity * (sale.sale_price - sale.cost_basis);
        let result = capital_gain_tax(gain, ctx.marginal_rate);

        let bucket = buckets
            .entry((year, sale.currency.clone()))
            .or_insert_with(|| YearCurrencyBucket {
                year,
                currency: sale.currency.clone(),
                ..Default::default()
            });
        bucket.capital_gains += gain;
        bucket.sale_tax += result.estimated_tax;
        bucket.total_tax += result.estimated_tax;
    }

    // Convert each native-currency subtotal first, sum after; summing mixed
    // currencies is never correct.
    let mut by_year: BTreeMap<i32, YearTotals> = BTreeMap::new();
    let mut by_currency: BTreeMap<String, YearTotals> = BTreeMap::new();
    let mut total_tax = 0.0;

    for ((year, currency), bucket) in &buckets {
        let year_end = NaiveDate::from_ymd_opt(*year, 12, 31)
            .ok_or_else(|| TaxError::InvalidInput(format!("Invalid year {}", year)))?;
        let rate = rate_for(currency, year_end)?;

        by_year.entry(*year).or_default().absorb_scaled(bucket, rate);
        by_currency
            .entry(currency.clone())
            .or_default()
            .absorb_scaled(bucket, 1.0);
        total_tax += bucket.total_tax * rate;
    }

    Ok(ScenarioSummary {
        reporting_currency: ctx.reporting_currency.clone(),
        buckets: buckets.into_values().collect(),
        by_year,
        by_currency,
        total_tax,
    })
}

impl TaxScenarioService {
    pub fn new(repository: Arc<TaxScenarioRepository>, fx: Arc<FxService>) -> Self {
        Self { repository, fx }
    }

    fn recompute(&self, scenario: &mut TaxScenario, ctx: &ScenarioContext) -> Result<()> {
        let fx = self.fx.clone();
        let reporting = ctx.reporting_currency.clone();
        let summary = build_summary(scenario, ctx, &move |currency, as_of| {
            fx.rate_on(currency, &reporting, as_of).map_err(TaxError::from)
        })?;
        scenario.summary = Some(summary);
        scenario.updated_at = Utc::now().naive_utc();
        Ok(())
    }

    pub fn create_scenario(&self, user_id: &str, name: &str) -> Result<TaxScenario> {
        if name.trim().is_empty() {
            return Err(TaxError::InvalidInput(
                "Scenario name cannot be empty".to_string(),
            ));
        }
        let now = Utc::now().naive_utc();
        let scenario = TaxScenario {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.trim().to_string(),
            exercises: Vec::new(),
            sales: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        };
        self.repository.insert(&scenario)?;
        Ok(scenario)
    }

    /// Copies a scenario with its events; lot references stay intact since
    /// exercise ids are preserved.
    pub fn clone_scenario(&self, scenario_id: &str, new_name: &str) -> Result<TaxScenario> {
        let source = self.repository.get(scenario_id)?;
        let now = Utc::now().naive_utc();
        let copy = TaxScenario {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: source.user_id.clone(),
            name: new_name.trim().to_string(),
            exercises: source.exercises.clone(),
            sales: source.sales.clone(),
            summary: source.summary.clone(),
            created_at: now,
            updated_at: now,
        };
        self.repository.insert(&copy)?;
        Ok(copy)
    }

    pub fn rename_scenario(&self, scenario_id: &str, new_name: &str) -> Result<TaxScenario> {
        let mut scenario = self.repository.get(scenario_id)?;
        if new_name.trim().is_empty() {
            return Err(TaxError::InvalidInput(
                "Scenario name cannot be empty".to_string(),
            ));
        }
        scenario.name = new_name.trim().to_string();
        scenario.updated_at = Utc::now().naive_utc();
        self.repository.save(&scenario)?;
        Ok(scenario)
    }

    pub fn delete_scenario(&self, scenario_id: &str) -> Result<()> {
        self.repository.delete(scenario_id)
    }

    pub fn get_scenario(&self, scenario_id: &str) -> Result<TaxScenario> {
        self.repository.get(scenario_id)
    }

    pub fn list_scenarios(&self, user_id: &str) -> Result<Vec<TaxScenario>> {
        self.repository.list_for_user(user_id)
    }

    pub fn add_exercise(
        &self,
        scenario_id: &str,
        input: NewSimulatedExercise,
        ctx: &ScenarioContext,
    ) -> Result<TaxScenario> {
        let mut scenario = self.repository.get(scenario_id)?;
        let exercise = input.into_exercise();
        validate_exercise(&scenario, &exercise, None, ctx)?;
        scenario.exercises.push(exercise);
        self.recompute(&mut scenario, ctx)?;
        self.repository.save(&scenario)?;
        Ok(scenario)
    }

    pub fn update_exercise(
        &self,
        scenario_id: &str,
        exercise: SimulatedExercise,
        ctx: &ScenarioContext,
    ) -> Result<TaxScenario> {
        let mut scenario = self.repository.get(scenario_id)?;

        let position = scenario
            .exercises
            .iter()
            .position(|e| e.id == exercise.id)
            .ok_or_else(|| TaxError::NotFound(format!("Exercise {}", exercise.id)))?;

        validate_exercise(&scenario, &exercise, Some(&exercise.id), ctx)?;

        // Shrinking a lot cannot strand sales already drawn from it
        let sold_from_lot: f64 = scenario
            .sales
            .iter()
            .filter(|sale| sale.lot_id.as_deref() == Some(exercise.id.as_str()))
            .map(|sale| sale.quantity)
            .sum();
        if sold_from_lot > exercise.quantity + 1e-9 {
            return Err(TaxError::ExceedsAvailableQuantity {
                grant_id: exercise.grant_id.clone(),
                requested: sold_from_lot,
                available: exercise.quantity,
            });
        }

        scenario.exercises[position] = exercise;
        self.recompute(&mut scenario, ctx)?;
        self.repository.save(&scenario)?;
        Ok(scenario)
    }

    pub fn delete_exercise(
        &self,
        scenario_id: &str,
        exercise_id: &str,
        ctx: &ScenarioContext,
    ) -> Result<TaxScenario> {
        let mut scenario = self.repository.get(scenario_id)?;

        if scenario
            .sales
            .iter()
            .any(|sale| sale.lot_id.as_deref() == Some(exercise_id))
        {
            return Err(TaxError::InvalidInput(
                "Cannot delete an exercise that sales still draw from".to_string(),
            ));
        }

        let before = scenario.exercises.len();
        scenario.exercises.retain(|e| e.id != exercise_id);
        if scenario.exercises.len() == before {
            return Err(TaxError::NotFound(format!("Exercise {}", exercise_id)));
        }

        self.recompute(&mut scenario, ctx)?;
        self.repository.save(&scenario)?;
        Ok(scenario)
    }

    pub fn add_sale(
        &self,
        scenario_id: &str,
        input: NewSimulatedSale,
        ctx: &ScenarioContext,
    ) -> Result<TaxScenario> {
        let mut scenario = self.repository.get(scenario_id)?;
        let sale = input.into_sale();
        validate_sale(&scenario, &sale, None, ctx)?;
        scenario.sales.push(sale);
        self.recompute(&mut scenario, ctx)?;
        self.repository.save(&scenario)?;
        Ok(scenario)
    }

    pub fn update_sale(
        &self,
        scenario_id: &str,
        sale: SimulatedSale,
        ctx: &ScenarioContext,
    ) -> Result<TaxScenario> {
        let mut scenario = self.repository.get(scenario_id)?;

        let position = scenario
            .sales
            .iter()
            .position(|s| s.id == sale.id)
            .ok_or_else(|| TaxError::NotFound(format!("Sale {}", sale.id)))?;

        validate_sale(&scenario, &sale, Some(&sale.id), ctx)?;

        scenario.sales[position] = sale;
        self.recompute(&mut scenario, ctx)?;
        self.repository.save(&scenario)?;
        Ok(scenario)
    }

    pub fn delete_sale(
        &self,
        scenario_id: &str,
        sale_id: &str,
        ctx: &ScenarioContext,
    ) -> Result<TaxScenario> {
        let mut scenario = self.repository.get(scenario_id)?;

        let before = scenario.sales.len();
        scenario.sales.retain(|s| s.id != sale_id);
        if scenario.sales.len() == before {
            return Err(TaxError::NotFound(format!("Sale {}", sale_id)));
        }

        self.recompute(&mut scenario, ctx)?;
        self.repository.save(&scenario)?;
        Ok(scenario)
    }

    /// Ranks a user's scenarios by converted total tax and reports how much
    /// each would save against the cheapest.
    pub fn compare_scenarios(
        &self,
        user_id: &str,
        ctx: &ScenarioContext,
    ) -> Result<ScenarioComparison> {
        let mut scenarios = self.repository.list_for_user(user_id)?;
        if scenarios.is_empty() {
            return Err(TaxError::NotFound(format!(
                "No scenarios for user {}",
                user_id
            )));
        }

        for scenario in scenarios.iter_mut() {
            self.recompute(scenario, ctx)?;
            self.repository.save(scenario)?;
        }

        let mut entries: Vec<ComparisonEntry> = scenarios
            .iter()
            .map(|scenario| ComparisonEntry {
                scenario_id: scenario.id.clone(),
                name: scenario.name.clone(),
                total_tax: scenario
                    .summary
                    .as_ref()
                    .map(|summary| summary.total_tax)
                    .unwrap_or(0.0),
                savings_vs_best: 0.0,
            })
            .collect();

        entries.sort_by(|a, b| {
            a.total_tax
                .partial_cmp(&b.total_tax)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let best_tax = entries[0].total_tax;
        let best_scenario_id = entries[0].scenario_id.clone();
        for entry in entries.iter_mut() {
            entry.savings_vs_best = entry.total_tax - best_tax;
        }

        Ok(ScenarioComparison {
            best_scenario_id,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_with(
        exercises: Vec<SimulatedExercise>,
        sales: Vec<SimulatedSale>,
    ) -> TaxScenario {
        let now = chrono::Utc::now().naive_utc();
        TaxScenario {
            id: "scenario-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Base".to_string(),
            exercises,
            sales,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn exercise(id: &str, grant: &str, quantity: f64, currency: &str) -> SimulatedExercise {
        SimulatedExercise {
            id: id.to_string(),
            grant_id: grant.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            quantity,
            strike_price: 2.0,
            fmv_at_exercise: 10.0,
            currency: currency.to_string(),
        }
    }

    fn sale(id: &str, grant: &str, lot: Option<&str>, quantity: f64, currency: &str) -> SimulatedSale {
        SimulatedSale {
            id: id.to_string(),
            grant_id: grant.to_string(),
            lot_id: lot.map(|l| l.to_string()),
            date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            quantity,
            sale_price: 15.0,
            cost_basis: 10.0,
            acquisition_date: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            currency: currency.to_string(),
        }
    }

    fn identity_rate(_currency: &str, _as_of: NaiveDate) -> Result<f64> {
        Ok(1.0)
    }

    #[test]
    fn exercise_beyond_vested_quantity_is_rejected() {
        let scenario = scenario_with(vec![exercise("e1", "grant-1", 600.0, "CAD")], vec![]);
        let mut ctx = ScenarioContext::new("CAD", 0.5);
        ctx.vested_by_grant.insert("grant-1".to_string(), 1_000.0);

        let over = exercise("e2", "grant-1", 500.0, "CAD");
        let err = validate_exercise(&scenario, &over, None, &ctx).unwrap_err();
        assert!(matches!(err, TaxError::ExceedsAvailableQuantity { .. }));

        let within = exercise("e2", "grant-1", 400.0, "CAD");
        assert!(validate_exercise(&scenario, &within, None, &ctx).is_ok());
    }

    #[test]
    fn sale_cannot_exceed_lot_quantity() {
        let scenario = scenario_with(
            vec![exercise("e1", "grant-1", 1_000.0, "CAD")],
            vec![sale("s1", "grant-1", Some("e1"), 700.0, "CAD")],
        );
        let ctx = ScenarioContext::new("CAD", 0.5);

        let over = sale("s2", "grant-1", Some("e1"), 400.0, "CAD");
        let err = validate_sale(&scenario, &over, None, &ctx).unwrap_err();
        assert!(matches!(err, TaxError::ExceedsAvailableQuantity { .. }));

        let within = sale("s2", "grant-1", Some("e1"), 300.0, "CAD");
        assert!(validate_sale(&scenario, &within, None, &ctx).is_ok());
    }

    #[test]
    fn sale_from_actual_lots_respects_context_quantities() {
        let scenario = scenario_with(vec![], vec![]);
        let mut ctx = ScenarioContext::new("CAD", 0.5);
        ctx.actual_exercised_by_grant
            .insert("grant-1".to_string(), 250.0);

        let within = sale("s1", "grant-1", None, 250.0, "CAD");
        assert!(validate_sale(&scenario, &within, None, &ctx).is_ok());

        let over = sale("s1", "grant-1", None, 251.0, "CAD");
        assert!(validate_sale(&scenario, &over, None, &ctx).is_err());
    }

    #[test]
    fn sale_referencing_unknown_lot_is_rejected() {
        let scenario = scenario_with(vec![], vec![]);
        let ctx = ScenarioContext::new("CAD", 0.5);
        let orphan = sale("s1", "grant-1", Some("missing"), 10.0, "CAD");
        assert!(matches!(
            validate_sale(&scenario, &orphan, None, &ctx),
            Err(TaxError::NotFound(_))
        ));
    }

    #[test]
    fn summary_buckets_by_year_and_currency() {
        let mut late_sale = sale("s1", "grant-1", Some("e1"), 400.0, "CAD");
        late_sale.date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();

        let scenario = scenario_with(
            vec![
                exercise("e1", "grant-1", 1_000.0, "CAD"),
                exercise("e2", "grant-2", 100.0, "USD"),
            ],
            vec![late_sale],
        );
        let ctx = ScenarioContext::new("CAD", 0.5);

        let summary = build_summary(&scenario, &ctx, &identity_rate).unwrap();

        assert_eq!(summary.buckets.len(), 3);
        assert!(summary.by_year.contains_key(&2025));
        assert!(summary.by_year.contains_key(&2026));
        assert!(summary.by_currency.contains_key("CAD"));
        assert!(summary.by_currency.contains_key("USD"));

        // 2026 holds only the sale: gain 400 x 5 = 2,000, half included,
        // taxed at 50%
        let sale_year = &summary.by_year[&2026];
        assert!((sale_year.capital_gains - 2_000.0).abs() < 1e-9);
        assert!((sale_year.sale_tax - 500.0).abs() < 1e-9);
    }

    #[test]
    fn exercise_tax_follows_benefit_minus_deduction() {
        let scenario = scenario_with(vec![exercise("e1", "grant-1", 1_000.0, "CAD")], vec![]);
        let ctx = ScenarioContext::new("CAD", 0.5);

        let summary = build_summary(&scenario, &ctx, &identity_rate).unwrap();
        let year = &summary.by_year[&2025];
        assert!((year.taxable_benefit - 8_000.0).abs() < 1e-9);
        assert!((year.stock_option_deduction - 4_000.0).abs() < 1e-9);
        assert!((year.exercise_tax - 2_000.0).abs() < 1e-9);
        assert!((summary.total_tax - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn single_currency_summary_matches_direct_sum() {
        // With every event already in the reporting currency,
        // convert-then-sum must equal the naive direct total
        let scenario = scenario_with(
            vec![
                exercise("e1", "grant-1", 1_000.0, "CAD"),
                exercise("e2", "grant-2", 500.0, "CAD"),
            ],
            vec![sale("s1", "grant-1", Some("e1"), 400.0, "CAD")],
        );
        let ctx = ScenarioContext::new("CAD", 0.5);

        let summary = build_summary(&scenario, &ctx, &identity_rate).unwrap();

        let direct: f64 = summary.buckets.iter().map(|bucket| bucket.total_tax).sum();
        assert!((summary.total_tax - direct).abs() < 1e-9);
    }

    #[test]
    fn cross_currency_totals_convert_before_summing() {
        let scenario = scenario_with(
            vec![
                exercise("e1", "grant-1", 1_000.0, "CAD"),
                exercise("e2", "grant-2", 1_000.0, "USD"),
            ],
            vec![],
        );
        let ctx = ScenarioContext::new("CAD", 0.5);

        let rate_for = |currency: &str, _as_of: NaiveDate| -> Result<f64> {
            Ok(if currency == "USD" { 1.35 } else { 1.0 })
        };
        let summary = build_summary(&scenario, &ctx, &rate_for).unwrap();

        // Each exercise taxes 2,000 natively; USD converts at 1.35
        assert!((summary.total_tax - (2_000.0 + 2_000.0 * 1.35)).abs() < 1e-9);
        // Native per-currency subtotals stay unconverted
        assert!((summary.by_currency["USD"].exercise_tax - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn missing_rate_surfaces_as_error() {
        let scenario = scenario_with(vec![exercise("e1", "grant-1", 10.0, "EUR")], vec![]);
        let ctx = ScenarioContext::new("CAD", 0.5);

        let rate_for = |currency: &str, as_of: NaiveDate| -> Result<f64> {
            Err(TaxError::Currency(crate::fx::FxError::NoRateAvailable {
                from: currency.to_string(),
                to: "CAD".to_string(),
                as_of,
            }))
        };
        assert!(build_summary(&scenario, &ctx, &rate_for).is_err());
    }
}
