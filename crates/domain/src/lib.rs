//! Domain layer for the report scheduler backend.
//!
//! This crate contains:
//! - Domain models (ReportSchedule, RunRecord, ReportDocument)
//! - Business logic services (recurrence, aggregation, schedule management)
//! - Collaborator contracts (schedule store, report data source)

pub mod models;
pub mod services;
