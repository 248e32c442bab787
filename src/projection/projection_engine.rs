use chrono::{Datelike, Months, NaiveDate};
use std::collections::BTreeMap;

use crate::errors::Result;
use crate::tax::effective_rate;

use super::projection_model::{
    CashFlow, ExpenseChangeType, MonthRow, ProjectionConfig, ProjectionEvent, ProjectionEventType,
    ProjectionLedger,
};

/// Month-by-month balance-sheet simulator.
///
/// A pure function of its inputs: no clocks, no randomness, and ordered maps
/// throughout, so two runs over the same config and ledger emit identical
/// rows.
pub struct ProjectionEngine;

/// Mutable baseline the automatic growth compounds from. A state-change
/// event overwrites a value and re-anchors its origin month, so growth
/// restarts from the new level.
struct Baseline {
    salary: f64,
    salary_growth: f64,
    salary_origin: u32,
    expenses: f64,
    expense_growth: f64,
    expense_origin: u32,
    savings_rate: f64,
}

impl Baseline {
    fn salary_at(&self, month: u32) -> f64 {
        let years = (month - self.salary_origin) as f64 / 12.0;
        self.salary * (1.0 + self.salary_growth).powf(years)
    }

    fn expenses_at(&self, month: u32) -> f64 {
        let years = (month - self.expense_origin) as f64 / 12.0;
        self.expenses * (1.0 + self.expense_growth).powf(years)
    }
}

struct DebtState {
    account_id: String,
    balance: f64,
    annual_rate: f64,
    scheduled_payment: f64,
}

/// One concrete firing of an event, positioned on the simulation timeline
struct Occurrence<'a> {
    month: u32,
    rank: u8,
    seq: usize,
    event: &'a ProjectionEvent,
}

fn months_between(start: NaiveDate, date: NaiveDate) -> i64 {
    (date.year() as i64 * 12 + date.month0() as i64)
        - (start.year() as i64 * 12 + start.month0() as i64)
}

/// Expands the event list into per-month occurrences inside the horizon.
/// Recurring events materialize lazily at their frequency until the horizon
/// or their own end date, whichever is first.
fn expand_events(config: &ProjectionConfig, horizon_months: u32) -> Vec<Occurrence<'_>> {
    let mut occurrences = Vec::new();

    for (seq, event) in config.events.iter().enumerate() {
        let base_month = months_between(config.start_date, event.date);

        if !event.is_recurring {
            if (0..=horizon_months as i64).contains(&base_month) {
                occurrences.push(Occurrence {
                    month: base_month as u32,
                    rank: event.event_type.rank(),
                    seq,
                    event,
                });
            }
            continue;
        }

        let step = event
            .recurrence_frequency
            .map(|f| f.months())
            .unwrap_or(1)
            .max(1) as i64;
        let end_month = event
            .recurrence_end_date
            .map(|end| months_between(config.start_date, end))
            .unwrap_or(horizon_months as i64)
            .min(horizon_months as i64);

        let mut occurrence_month = base_month;
        while occurrence_month <= end_month {
            if occurrence_month >= 0 {
                occurrences.push(Occurrence {
                    month: occurrence_month as u32,
                    rank: event.event_type.rank(),
                    seq,
                    event,
                });
            }
            occurrence_month += step;
        }
    }

    occurrences.sort_by_key(|occ| (occ.month, occ.rank, occ.seq));
    occurrences
}

impl ProjectionEngine {
    pub fn run(config: &ProjectionConfig, ledger: &ProjectionLedger) -> Result<Vec<MonthRow>> {
        config.validate()?;

        let horizon_months = config.time_horizon_years * 12;

        let mut baseline = Baseline {
            salary: config.annual_salary,
            salary_growth: config.annual_salary_growth,
            salary_origin: 0,
            expenses: config.monthly_expenses,
            expense_growth: config.annual_expense_growth,
            expense_origin: 0,
            savings_rate: config.monthly_savings_rate,
        };

        let mut investments: BTreeMap<String, f64> = ledger
            .investment_balances
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let mut asset_values: BTreeMap<String, f64> = ledger
            .asset_values
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let mut debts: Vec<DebtState> = ledger
            .debts
            .iter()
            .map(|debt| DebtState {
                account_id: debt.account_id.clone(),
                balance: debt.balance.max(0.0),
                annual_rate: debt.annual_rate,
                scheduled_payment: debt.scheduled_payment,
            })
            .collect();

        let occurrences = expand_events(config, horizon_months);
        let mut cursor = 0usize;

        let mut rows = Vec::with_capacity(horizon_months as usize + 1);

        for month in 0..=horizon_months {
            let mut one_time_income = 0.0;
            let mut one_time_expense = 0.0;
            let mut event_debt_payments: BTreeMap<String, f64> = BTreeMap::new();

            while cursor < occurrences.len() && occurrences[cursor].month == month {
                let event = occurrences[cursor].event;
                Self::apply_event(
                    event,
                    month,
                    &mut baseline,
                    &mut one_time_income,
                    &mut one_time_expense,
                    &mut event_debt_payments,
                );
                cursor += 1;
            }

            let current_salary = baseline.salary_at(month);
            let current_expenses = baseline.expenses_at(month);

            // The tax rate is looked up against annualized income, then
            // applied to the monthly figure
            let gross_monthly = current_salary / 12.0;
            let annualized_income = current_salary + one_time_income * 12.0;
            let tax_rate = effective_rate(
                &config.federal_tax_brackets,
                &config.provincial_tax_brackets,
                annualized_income,
            );
            let net_monthly = gross_monthly * (1.0 - tax_rate) + one_time_income;

            let total_expenses = current_expenses + one_time_expense;
            let net_cash_flow = net_monthly - total_expenses;
            let savings = net_cash_flow.max(0.0) * baseline.savings_rate;

            for (account_id, balance) in investments.iter_mut() {
                let annual_return = config
                    .investment_returns
                    .get(account_id)
                    .copied()
                    .unwrap_or(0.0);
                let allocation = config
                    .savings_allocation
                    .get(account_id)
                    .copied()
                    .unwrap_or(0.0);
                *balance = *balance * (1.0 + annual_return / 12.0) + savings * allocation;
            }

            for debt in debts.iter_mut() {
                if debt.balance <= 0.0 {
                    // Paid off; no further interest accrues
                    debt.balance = 0.0;
                    continue;
                }
                let interest = debt.balance * debt.annual_rate / 12.0;
                let principal = (debt.scheduled_payment - interest).max(0.0);
                let extra = config
                    .extra_debt_payments
                    .get(&debt.account_id)
                    .copied()
                    .unwrap_or(0.0)
                    + event_debt_payments
                        .get(&debt.account_id)
                        .copied()
                        .unwrap_or(0.0);
                debt.balance = (debt.balance - principal - extra).max(0.0);
            }

            for (account_id, value) in asset_values.iter_mut() {
                let rate = config
                    .asset_appreciation
                    .get(account_id)
                    .copied()
                    .unwrap_or(0.0);
                *value *= 1.0 + rate / 12.0;
            }

            let mut asset_breakdown: BTreeMap<String, f64> = BTreeMap::new();
            for (account_id, balance) in &investments {
                asset_breakdown.insert(account_id.clone(), *balance);
            }
            for (account_id, value) in &asset_values {
                asset_breakdown.insert(account_id.clone(), *value);
            }
            let assets_total: f64 = asset_breakdown.values().sum();

            let mut debt_payoff: BTreeMap<String, f64> = BTreeMap::new();
            for debt in &debts {
                debt_payoff.insert(debt.account_id.clone(), debt.balance);
            }
            let total_debt: f64 = debt_payoff.values().sum();

            let date = config
                .start_date
                .checked_add_months(Months::new(month))
                .unwrap_or(config.start_date);

            rows.push(MonthRow {
                month,
                date,
                net_worth: assets_total - total_debt,
                assets: assets_total,
                liabilities: total_debt,
                cash_flow: CashFlow {
                    income: net_monthly,
                    expenses: total_expenses,
                    net: net_cash_flow,
                },
                asset_breakdown,
                debt_payoff,
                total_debt,
            });
        }

        Ok(rows)
    }

    fn apply_event(
        event: &ProjectionEvent,
        month: u32,
        baseline: &mut Baseline,
        one_time_income: &mut f64,
        one_time_expense: &mut f64,
        event_debt_payments: &mut BTreeMap<String, f64>,
    ) {
        match event.event_type {
            ProjectionEventType::OneTimeIncome => {
                *one_time_income += event.amount.unwrap_or(0.0);
            }
            ProjectionEventType::OneTimeExpense => {
                *one_time_expense += event.amount.unwrap_or(0.0);
            }
            ProjectionEventType::ExtraDebtPayment => {
                if let (Some(account_id), Some(amount)) = (&event.account_id, event.amount) {
                    *event_debt_payments.entry(account_id.clone()).or_insert(0.0) += amount;
                }
            }
            ProjectionEventType::SalaryChange => {
                if let Some(new_salary) = event.new_salary {
                    baseline.salary = new_salary;
                    baseline.salary_origin = month;
                }
                if let Some(new_growth) = event.new_salary_growth {
                    baseline.salary_growth = new_growth;
                    baseline.salary_origin = month;
                }
            }
            ProjectionEventType::ExpenseLevelChange => {
                if let Some(new_expenses) = event.new_expenses {
                    baseline.expenses = new_expenses;
                    baseline.expense_origin = month;
                } else if let Some(change) = event.expense_change {
                    let current = baseline.expenses_at(month);
                    baseline.expenses = match event
                        .expense_change_type
                        .unwrap_or(ExpenseChangeType::Absolute)
                    {
                        ExpenseChangeType::Absolute => change,
                        ExpenseChangeType::RelativeAmount => current + change,
                        ExpenseChangeType::RelativePercent => current * (1.0 + change / 100.0),
                    };
                    baseline.expense_origin = month;
                }
            }
            ProjectionEventType::SavingsRateChange => {
                if let Some(rate) = event.new_savings_rate {
                    baseline.savings_rate = rate.clamp(0.0, 1.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::projection_model::{ProjectionLedger, RecurrenceFrequency};
    use crate::tax::TaxBracket;
    use std::collections::HashMap;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn date_at_month(month: u32) -> NaiveDate {
        start().checked_add_months(Months::new(month)).unwrap()
    }

    fn baseline_config() -> ProjectionConfig {
        ProjectionConfig {
            start_date: start(),
            time_horizon_years: 1,
            inflation_rate: 0.02,
            annual_salary: 80_000.0,
            annual_salary_growth: 0.03,
            federal_tax_brackets: Vec::new(),
            provincial_tax_brackets: Vec::new(),
            monthly_expenses: 3_000.0,
            annual_expense_growth: 0.02,
            monthly_savings_rate: 0.20,
            investment_returns: HashMap::from([("invest".to_string(), 0.0)]),
            asset_appreciation: HashMap::new(),
            extra_debt_payments: HashMap::new(),
            savings_allocation: HashMap::from([("invest".to_string(), 1.0)]),
            events: Vec::new(),
        }
    }

    fn baseline_ledger() -> ProjectionLedger {
        ProjectionLedger {
            investment_balances: HashMap::from([("invest".to_string(), 0.0)]),
            asset_values: HashMap::new(),
            debts: Vec::new(),
        }
    }

    #[test]
    fn baseline_growth_tracks_compound_rates() {
        let rows = ProjectionEngine::run(&baseline_config(), &baseline_ledger()).unwrap();
        assert_eq!(rows.len(), 13);

        // Month 12: one full year of growth
        let final_row = &rows[12];
        let expected_salary_monthly = 80_000.0 * 1.03 / 12.0;
        assert!((final_row.cash_flow.income - expected_salary_monthly).abs() < 1e-6);
        assert!((final_row.cash_flow.expenses - 3_000.0 * 1.02).abs() < 1e-6);
    }

    #[test]
    fn zero_return_account_accumulates_exactly_the_saved_cash() {
        let config = baseline_config();
        let rows = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();

        // With a 0% return the final balance equals the sum of monthly
        // savings contributions
        let expected: f64 = (0..=12)
            .map(|m| {
                let salary = 80_000.0 * 1.03f64.powf(m as f64 / 12.0) / 12.0;
                let expenses = 3_000.0 * 1.02f64.powf(m as f64 / 12.0);
                (salary - expenses).max(0.0) * 0.20
            })
            .sum();

        let balance = rows[12].asset_breakdown["invest"];
        assert!(
            (balance - expected).abs() < 1e-6,
            "balance {} vs expected {}",
            balance,
            expected
        );
    }

    #[test]
    fn salary_change_event_reanchors_compounding() {
        let mut config = baseline_config();
        config.time_horizon_years = 3;
        let mut event = ProjectionEvent::one_time(
            "raise",
            date_at_month(24),
            ProjectionEventType::SalaryChange,
            0.0,
        );
        event.amount = None;
        event.new_salary = Some(120_000.0);
        config.events = vec![event];

        let rows = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();

        // At the event month the new baseline applies unscaled
        assert!((rows[24].cash_flow.income - 120_000.0 / 12.0).abs() < 1e-6);
        // One year later the new baseline has compounded once
        assert!((rows[36].cash_flow.income - 120_000.0 * 1.03 / 12.0).abs() < 1e-6);
        // Before the event the old baseline still rules
        assert!((rows[12].cash_flow.income - 80_000.0 * 1.03 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn effective_tax_rate_reduces_net_income() {
        let mut config = baseline_config();
        config.federal_tax_brackets = vec![TaxBracket {
            up_to_income: 0.0,
            rate: 0.25,
        }];
        let rows = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();

        let expected_net = 80_000.0 / 12.0 * 0.75;
        assert!((rows[0].cash_flow.income - expected_net).abs() < 1e-6);
    }

    #[test]
    fn expense_change_semantics() {
        for (change_type, change, expected) in [
            (ExpenseChangeType::Absolute, 2_500.0, 2_500.0),
            (ExpenseChangeType::RelativeAmount, 500.0, 3_500.0),
            (ExpenseChangeType::RelativePercent, 10.0, 3_300.0),
        ] {
            let mut config = baseline_config();
            config.annual_expense_growth = 0.0;
            let mut event = ProjectionEvent::one_time(
                "exp",
                date_at_month(6),
                ProjectionEventType::ExpenseLevelChange,
                0.0,
            );
            event.amount = None;
            event.expense_change = Some(change);
            event.expense_change_type = Some(change_type);
            config.events = vec![event];

            let rows = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();
            assert!(
                (rows[6].cash_flow.expenses - expected).abs() < 1e-6,
                "{:?}: {} vs {}",
                change_type,
                rows[6].cash_flow.expenses,
                expected
            );
        }
    }

    #[test]
    fn one_time_events_hit_only_their_month() {
        let mut config = baseline_config();
        config.events = vec![
            ProjectionEvent::one_time(
                "bonus",
                date_at_month(3),
                ProjectionEventType::OneTimeIncome,
                10_000.0,
            ),
            ProjectionEvent::one_time(
                "roof",
                date_at_month(3),
                ProjectionEventType::OneTimeExpense,
                4_000.0,
            ),
        ];

        let rows = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();
        let ordinary = &rows[2];
        let eventful = &rows[3];

        assert!(eventful.cash_flow.income > ordinary.cash_flow.income + 9_999.0);
        assert!(eventful.cash_flow.expenses > ordinary.cash_flow.expenses + 3_999.0);
    }

    #[test]
    fn events_past_horizon_are_ignored() {
        let mut config = baseline_config();
        config.events = vec![ProjectionEvent::one_time(
            "late",
            date_at_month(60),
            ProjectionEventType::OneTimeIncome,
            1_000_000.0,
        )];

        let with_event = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();
        config.events.clear();
        let without_event = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();
        assert_eq!(with_event, without_event);
    }

    #[test]
    fn recurring_events_expand_until_end_date() {
        let mut config = baseline_config();
        let mut event = ProjectionEvent::one_time(
            "rental",
            date_at_month(1),
            ProjectionEventType::OneTimeIncome,
            500.0,
        );
        event.is_recurring = true;
        event.recurrence_frequency = Some(RecurrenceFrequency::Monthly);
        event.recurrence_end_date = Some(date_at_month(4));
        config.events = vec![event];

        let rows = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();
        for month in [1usize, 2, 3, 4] {
            assert!(
                rows[month].cash_flow.income > rows[0].cash_flow.income + 499.0,
                "month {} should carry the recurring income",
                month
            );
        }
        assert!(rows[5].cash_flow.income < rows[0].cash_flow.income + 100.0);
    }

    #[test]
    fn debt_amortizes_and_clamps_at_zero() {
        let mut config = baseline_config();
        config.time_horizon_years = 2;
        let ledger = ProjectionLedger {
            investment_balances: HashMap::new(),
            asset_values: HashMap::new(),
            debts: vec![super::super::projection_model::DebtSchedule {
                account_id: "loan".to_string(),
                balance: 5_000.0,
                annual_rate: 0.12,
                scheduled_payment: 1_000.0,
            }],
        };

        let rows = ProjectionEngine::run(&config, &ledger).unwrap();

        // Balance decreases month over month until it hits zero, then stays
        let mut previous = f64::MAX;
        let mut hit_zero = false;
        for row in &rows {
            let balance = row.debt_payoff["loan"];
            assert!(balance <= previous + 1e-9);
            assert!(balance >= 0.0);
            if balance == 0.0 {
                hit_zero = true;
            }
            if hit_zero {
                assert_eq!(balance, 0.0);
            }
            previous = balance;
        }
        assert!(hit_zero, "loan should be repaid inside the horizon");
        assert_eq!(rows.last().unwrap().total_debt, 0.0);
    }

    #[test]
    fn zero_horizon_emits_month_zero_only() {
        let mut config = baseline_config();
        config.time_horizon_years = 0;
        let rows = ProjectionEngine::run(&config, &baseline_ledger()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].month, 0);
    }

    #[test]
    fn projection_is_deterministic() {
        let mut config = baseline_config();
        config.time_horizon_years = 5;
        config.events = vec![ProjectionEvent::one_time(
            "bonus",
            date_at_month(7),
            ProjectionEventType::OneTimeIncome,
            2_500.0,
        )];
        let ledger = baseline_ledger();

        let first = ProjectionEngine::run(&config, &ledger).unwrap();
        let second = ProjectionEngine::run(&config, &ledger).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn appreciating_asset_compounds_monthly() {
        let mut config = baseline_config();
        config.asset_appreciation = HashMap::from([("house".to_string(), 0.06)]);
        let ledger = ProjectionLedger {
            investment_balances: HashMap::new(),
            asset_values: HashMap::from([("house".to_string(), 500_000.0)]),
            debts: Vec::new(),
        };

        let rows = ProjectionEngine::run(&config, &ledger).unwrap();
        let expected = 500_000.0 * (1.0 + 0.06 / 12.0f64).powi(13);
        assert!((rows[12].asset_breakdown["house"] - expected).abs() < 1e-3);
    }
}
