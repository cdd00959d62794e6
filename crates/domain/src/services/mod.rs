//! Domain services for report scheduling.
//!
//! Pure computation (recurrence, aggregation) plus the collaborator traits
//! the dispatcher and HTTP layer are written against.

pub mod aggregation;
pub mod data_source;
pub mod recurrence;
pub mod schedule_manager;
pub mod schedule_store;

pub use aggregation::{build_document, ItemizedOptions};
pub use data_source::{DataSourceError, InMemoryReportDataSource, ReportDataSource};
pub use recurrence::{next_run, FrequencyDescriptor, FrequencyError, Recurrence};
pub use schedule_manager::{describe_validation_errors, ScheduleError, ScheduleManager};
pub use schedule_store::{
    Claim, ClaimOutcome, InMemoryScheduleStore, OutcomeUpdate, ScheduleListFilter, ScheduleStore,
    StoreError, UpdateScope, DEFAULT_CLAIM_LEASE_SECS,
};
