//! Background job scheduler and job implementations.

mod pool_metrics;
mod report_dispatch;
mod run_history_cleanup;
mod scheduler;

pub use pool_metrics::PoolMetricsJob;
pub use report_dispatch::ReportDispatchJob;
pub use run_history_cleanup::RunHistoryCleanupJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
