pub(crate) mod scenario_model;
pub(crate) mod scenario_repository;
pub(crate) mod scenario_service;
pub(crate) mod tax_calculator;
pub(crate) mod tax_config_repository;
pub(crate) mod tax_errors;
pub(crate) mod tax_model;

pub use scenario_model::{
    ComparisonEntry, NewSimulatedExercise, NewSimulatedSale, ScenarioComparison, ScenarioContext,
    ScenarioSummary, SimulatedExercise, SimulatedSale, TaxScenario, YearCurrencyBucket, YearTotals,
};
pub use scenario_repository::TaxScenarioRepository;
pub use scenario_service::TaxScenarioService;
pub use tax_calculator::{
    capital_gain_tax, compute_tax, cpp_contribution, effective_rate, ei_contribution,
    marginal_rate_of, option_benefit, progressive_tax, CapitalGainTax, OptionBenefit,
    TaxBreakdown,
};
pub use tax_config_repository::TaxConfigRepository;
pub use tax_errors::TaxError;
pub use tax_model::{FieldSource, TaxBracket, TaxConfiguration, TaxParameters};
