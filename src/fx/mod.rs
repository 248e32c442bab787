pub mod fx_errors;
pub mod fx_model;
pub mod fx_repository;
pub mod fx_service;

pub use fx_errors::FxError;
pub use fx_model::{ExchangeRate, NewExchangeRate};
pub use fx_repository::FxRepository;
pub use fx_service::FxService;
