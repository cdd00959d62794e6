//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod report_item;
pub mod report_run;
pub mod report_schedule;

pub use report_item::ReportItemEntity;
pub use report_run::ReportRunEntity;
pub use report_schedule::{ReportScheduleEntity, REPORT_SCHEDULE_COLUMNS};
