//! Persistence layer for the report scheduler backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL implementations of the schedule store and report data source

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;

/// Embedded SQL migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./src/migrations");
