//! HTTP service, dispatcher and background jobs for scheduled asset reports.

pub mod app;
pub mod config;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;
