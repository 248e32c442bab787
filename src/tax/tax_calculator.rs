use serde::{Deserialize, Serialize};

use super::tax_model::{TaxBracket, TaxParameters};

/// Canadian capital-gains inclusion rate, independent of holding period
pub const CAPITAL_GAINS_INCLUSION_RATE: f64 = 0.5;

/// Deduction rate for qualified stock-option benefits
pub const STOCK_OPTION_DEDUCTION_RATE: f64 = 0.5;

/// Evaluates progressive brackets over an income. The `up_to_income = 0`
/// sentinel marks the unlimited top bracket.
pub fn progressive_tax(brackets: &[TaxBracket], income: f64) -> f64 {
    let mut total = 0.0;
    let mut remaining = income.max(0.0);
    let mut previous_ceiling = 0.0;

    for bracket in brackets {
        let width = if bracket.up_to_income == 0.0 {
            remaining
        } else {
            remaining.min(bracket.up_to_income - previous_ceiling)
        };
        total += width * bracket.rate;
        remaining -= width;
        previous_ceiling = bracket.up_to_income;
        if remaining <= 0.0 {
            break;
        }
    }

    total
}

/// Rate of the first bracket; the rate the basic-personal-amount credit is
/// valued at
pub fn lowest_rate(brackets: &[TaxBracket]) -> f64 {
    brackets.first().map(|bracket| bracket.rate).unwrap_or(0.0)
}

/// Rate of the bracket the next earned dollar falls into
pub fn marginal_rate_of(brackets: &[TaxBracket], income: f64) -> f64 {
    for bracket in brackets {
        if bracket.up_to_income == 0.0 || income <= bracket.up_to_income {
            return bracket.rate;
        }
    }
    brackets.last().map(|bracket| bracket.rate).unwrap_or(0.0)
}

/// Combined federal + provincial average rate on an income. Used by the
/// projection engine's monthly net-income step.
pub fn effective_rate(
    federal_brackets: &[TaxBracket],
    provincial_brackets: &[TaxBracket],
    income: f64,
) -> f64 {
    if income <= 0.0 {
        return 0.0;
    }
    let total =
        progressive_tax(federal_brackets, income) + progressive_tax(provincial_brackets, income);
    total / income
}

/// CPP contribution: pensionable earnings above the basic exemption, up to
/// the yearly ceiling
pub fn cpp_contribution(params: &TaxParameters, employment_income: f64) -> f64 {
    let pensionable = employment_income.min(params.cpp_max_pensionable);
    (pensionable - params.cpp_basic_exemption).max(0.0) * params.cpp_rate
}

/// EI contribution up to the maximum insurable earnings
pub fn ei_contribution(params: &TaxParameters, employment_income: f64) -> f64 {
    employment_income.min(params.ei_max_insurable) * params.ei_rate
}

/// Full-year breakdown for a taxable income
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub federal_tax: f64,
    pub provincial_tax: f64,
    pub cpp: f64,
    pub ei: f64,
    pub total_tax: f64,
    pub effective_rate: f64,
    pub marginal_rate: f64,
    pub after_tax_income: f64,
}

/// Computes the year's liability: progressive federal and provincial tax
/// less the basic-personal-amount credit, plus payroll contributions.
pub fn compute_tax(
    params: &TaxParameters,
    taxable_income: f64,
    employment_income: f64,
) -> TaxBreakdown {
    let federal_before_credit = progressive_tax(&params.federal_brackets, taxable_income);
    let federal_credit = params.basic_personal_amount * lowest_rate(&params.federal_brackets);
    let federal_tax = (federal_before_credit - federal_credit).max(0.0);

    let provincial_tax = progressive_tax(&params.provincial_brackets, taxable_income);

    let cpp = cpp_contribution(params, employment_income);
    let ei = ei_contribution(params, employment_income);

    let total_tax = federal_tax + provincial_tax + cpp + ei;
    let effective = if taxable_income > 0.0 {
        total_tax / taxable_income
    } else {
        0.0
    };
    let marginal = marginal_rate_of(&params.federal_brackets, taxable_income)
        + marginal_rate_of(&params.provincial_brackets, taxable_income);

    TaxBreakdown {
        federal_tax,
        provincial_tax,
        cpp,
        ei,
        total_tax,
        effective_rate: effective,
        marginal_rate: marginal,
        after_tax_income: taxable_income - total_tax,
    }
}

/// Stock-option taxable benefit for one exercise
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionBenefit {
    pub taxable_benefit: f64,
    pub deduction: f64,
    pub net_taxable: f64,
}

/// Benefit = quantity x (FMV - strike); a qualified exercise deducts half
pub fn option_benefit(
    quantity: f64,
    strike_price: f64,
    fmv_at_exercise: f64,
    qualifies_for_deduction: bool,
) -> OptionBenefit {
    let taxable_benefit = quantity * (fmv_at_exercise - strike_price);
    let deduction = if qualifies_for_deduction {
        taxable_benefit.max(0.0) * STOCK_OPTION_DEDUCTION_RATE
    } else {
        0.0
    };
    OptionBenefit {
        taxable_benefit,
        deduction,
        net_taxable: taxable_benefit - deduction,
    }
}

/// Capital-gain taxable portion and estimated tax at the caller's marginal
/// rate. The gain may be negative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalGainTax {
    pub gain: f64,
    pub taxable_portion: f64,
    pub estimated_tax: f64,
}

pub fn capital_gain_tax(gain: f64, marginal_rate: f64) -> CapitalGainTax {
    let taxable_portion = gain * CAPITAL_GAINS_INCLUSION_RATE;
    CapitalGainTax {
        gain,
        taxable_portion,
        estimated_tax: taxable_portion * marginal_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn federal_brackets_2024() -> Vec<TaxBracket> {
        vec![
            TaxBracket { up_to_income: 55_867.0, rate: 0.15 },
            TaxBracket { up_to_income: 111_733.0, rate: 0.205 },
            TaxBracket { up_to_income: 0.0, rate: 0.26 },
        ]
    }

    #[test]
    fn progressive_tax_on_hundred_thousand() {
        let tax = progressive_tax(&federal_brackets_2024(), 100_000.0);
        // 55,867 x 0.15 + (100,000 - 55,867) x 0.205
        assert!((tax - 17_427.315).abs() < 0.01, "got {}", tax);
    }

    #[test]
    fn progressive_tax_sums_bracket_slices() {
        // Closed form: sum over (min(I, up_k) - min(I, up_{k-1})) x rate_k
        let brackets = federal_brackets_2024();
        for income in [0.0f64, 10_000.0, 55_867.0, 80_000.0, 111_733.0, 200_000.0] {
            let expected: f64 = {
                let mut total = 0.0;
                let mut previous = 0.0;
                for bracket in &brackets {
                    let ceiling = if bracket.up_to_income == 0.0 {
                        f64::INFINITY
                    } else {
                        bracket.up_to_income
                    };
                    total += (income.min(ceiling) - income.min(previous)) * bracket.rate;
                    previous = ceiling;
                }
                total
            };
            let actual = progressive_tax(&brackets, income);
            assert!(
                (actual - expected).abs() < 1e-9,
                "income {}: {} vs {}",
                income,
                actual,
                expected
            );
        }
    }

    #[test]
    fn income_inside_top_bracket_uses_unlimited_width() {
        let tax = progressive_tax(&federal_brackets_2024(), 150_000.0);
        let expected = 55_867.0 * 0.15 + (111_733.0 - 55_867.0) * 0.205 + (150_000.0 - 111_733.0) * 0.26;
        assert!((tax - expected).abs() < 1e-9);
    }

    #[test]
    fn zero_and_negative_income_owe_nothing() {
        assert_eq!(progressive_tax(&federal_brackets_2024(), 0.0), 0.0);
        assert_eq!(progressive_tax(&federal_brackets_2024(), -5_000.0), 0.0);
    }

    #[test]
    fn marginal_rate_walks_brackets() {
        let brackets = federal_brackets_2024();
        assert_eq!(marginal_rate_of(&brackets, 10_000.0), 0.15);
        assert_eq!(marginal_rate_of(&brackets, 80_000.0), 0.205);
        assert_eq!(marginal_rate_of(&brackets, 500_000.0), 0.26);
    }

    #[test]
    fn cpp_respects_exemption_and_ceiling() {
        let params = TaxParameters::canada_bc_2024();
        // Below the exemption nothing is owed
        assert_eq!(cpp_contribution(&params, 3_000.0), 0.0);
        // Mid-range: (income - exemption) x rate
        let mid = cpp_contribution(&params, 50_000.0);
        assert!((mid - (50_000.0 - 3_500.0) * 0.0595).abs() < 1e-9);
        // Above the ceiling contributions stop growing
        let capped = cpp_contribution(&params, 500_000.0);
        assert!((capped - (68_500.0 - 3_500.0) * 0.0595).abs() < 1e-9);
    }

    #[test]
    fn ei_caps_at_max_insurable() {
        let params = TaxParameters::canada_bc_2024();
        let below = ei_contribution(&params, 40_000.0);
        assert!((below - 40_000.0 * 0.0166).abs() < 1e-9);
        let capped = ei_contribution(&params, 200_000.0);
        assert!((capped - 63_200.0 * 0.0166).abs() < 1e-9);
    }

    #[test]
    fn basic_personal_amount_credit_never_goes_negative() {
        let mut params = TaxParameters::canada_bc_2024();
        params.basic_personal_amount = 1_000_000.0;
        let breakdown = compute_tax(&params, 20_000.0, 0.0);
        assert_eq!(breakdown.federal_tax, 0.0);
    }

    #[test]
    fn exercise_scenario_from_grant() {
        // 1,000 options, $2 strike, $10 FMV, 50% marginal rate
        let benefit = option_benefit(1_000.0, 2.0, 10.0, true);
        assert_eq!(benefit.taxable_benefit, 8_000.0);
        assert_eq!(benefit.deduction, 4_000.0);
        assert_eq!(benefit.net_taxable, 4_000.0);
        assert_eq!(benefit.net_taxable * 0.5, 2_000.0);
    }

    #[test]
    fn sale_scenario_capital_gain() {
        // 1,000 shares, $10 cost basis, $15 sale, 50% marginal rate
        let gain = 1_000.0 * (15.0 - 10.0);
        let result = capital_gain_tax(gain, 0.5);
        assert_eq!(result.gain, 5_000.0);
        assert_eq!(result.taxable_portion, 2_500.0);
        assert_eq!(result.estimated_tax, 1_250.0);
    }

    #[test]
    fn capital_losses_produce_negative_tax_offset() {
        let result = capital_gain_tax(-4_000.0, 0.5);
        assert_eq!(result.taxable_portion, -2_000.0);
        assert_eq!(result.estimated_tax, -1_000.0);
    }

    #[test]
    fn effective_rate_is_zero_on_zero_income() {
        assert_eq!(effective_rate(&federal_brackets_2024(), &[], 0.0), 0.0);
    }
}
