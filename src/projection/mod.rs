pub(crate) mod projection_engine;
pub(crate) mod projection_model;

pub use projection_engine::ProjectionEngine;
pub use projection_model::{
    CashFlow, DebtSchedule, ExpenseChangeType, MonthRow, ProjectionConfig, ProjectionEvent,
    ProjectionEventType, ProjectionLedger, RecurrenceFrequency,
};
