//! Repository implementations for database operations.

pub mod report_item;
pub mod report_schedule;

pub use report_item::ReportItemRepository;
pub use report_schedule::ReportScheduleRepository;
