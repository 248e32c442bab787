pub(crate) mod balances_model;
pub(crate) mod balances_repository;

pub use balances_model::{Balance, BalanceDB, NewBalance};
pub use balances_repository::BalanceRepository;
