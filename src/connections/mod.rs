pub(crate) mod connections_model;
pub(crate) mod connections_repository;
pub(crate) mod connections_service;
pub(crate) mod sync_errors;
pub(crate) mod token_refresher;

pub use connections_model::{
    Connection, ConnectionDB, ConnectionStatus, ConnectionSummary, NewConnection, SyncFrequency,
};
pub use connections_repository::ConnectionRepository;
pub use connections_service::{
    classify_sync_error, ConnectionService, CANONICAL_AUTH_MESSAGE, SESSION_EXPIRED_MESSAGE,
};
pub use sync_errors::SyncError;
pub use token_refresher::TokenRefresher;
