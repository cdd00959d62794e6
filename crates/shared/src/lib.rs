//! Shared utilities and common types for the report scheduler backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Email address and recipient list validation
//! - Frequency field range checks
//! - Time-of-day parsing

pub mod validation;
