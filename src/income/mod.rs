pub(crate) mod income_model;
pub(crate) mod income_repository;
pub(crate) mod income_service;

pub use income_model::{IncomeCategory, IncomeFrequency, IncomeRecord, NewIncomeRecord};
pub use income_repository::IncomeRepository;
pub use income_service::IncomeService;
