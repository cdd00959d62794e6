//! HTTP route handlers.

pub mod health;
pub mod report_schedules;
