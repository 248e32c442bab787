pub(crate) mod holdings_model;
pub(crate) mod holdings_repository;

pub use holdings_model::{Holding, HoldingDB, NewHolding};
pub use holdings_repository::HoldingRepository;
