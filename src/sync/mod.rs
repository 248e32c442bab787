pub(crate) mod lease;
pub(crate) mod mapping;
pub(crate) mod sync_model;
pub(crate) mod sync_repository;
pub(crate) mod sync_worker;

pub use lease::SyncLease;
pub use mapping::{holding_type_for_security, local_account_type};
pub use sync_model::{
    JobCounters, NewSyncedAccount, SyncJob, SyncJobStatus, SyncJobType, SyncOutcome, SyncedAccount,
};
pub use sync_repository::SyncRepository;
pub use sync_worker::{start_worker_pool, SyncHandle, SyncWorker};
