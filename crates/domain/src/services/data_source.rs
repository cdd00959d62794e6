//! Report data source.
//!
//! The business schema (assets, categories, maintenance records) lives
//! outside this service. The generator only needs a read-only query that
//! returns normalized rows for a report type.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use thiserror::Error;

use crate::models::{ReportFilters, ReportItem, ReportType};

/// Data source failure. Always fatal for the run that hit it.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("Report data source unavailable: {0}")]
    Unavailable(String),

    #[error("Report query failed: {0}")]
    Query(String),
}

/// Read-only query capability per report type.
///
/// Implementations may push filters down to the backing store; the
/// generator re-applies them in memory, so returning a superset is fine.
#[async_trait::async_trait]
pub trait ReportDataSource: Send + Sync {
    async fn fetch_items(
        &self,
        report_type: ReportType,
        filters: &ReportFilters,
    ) -> Result<Vec<ReportItem>, DataSourceError>;
}

/// In-memory data source for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryReportDataSource {
    items: RwLock<HashMap<ReportType, Vec<ReportItem>>>,
    unavailable: AtomicBool,
}

impl InMemoryReportDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load fixtures from a JSON object keyed by report type.
    ///
    /// ```json
    /// { "assets": [{ "id": "1", "reference": "AT-1", "name": "Laptop" }] }
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, DataSourceError> {
        let raw: HashMap<String, Vec<ReportItem>> = serde_json::from_str(json)
            .map_err(|e| DataSourceError::Unavailable(format!("invalid fixture data: {}", e)))?;

        let mut items = HashMap::new();
        for (key, rows) in raw {
            let report_type = key
                .parse::<ReportType>()
                .map_err(DataSourceError::Unavailable)?;
            items.insert(report_type, rows);
        }

        Ok(Self {
            items: RwLock::new(items),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DataSourceError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Replace the rows served for `report_type`.
    pub fn set_items(&self, report_type: ReportType, rows: Vec<ReportItem>) {
        if let Ok(mut items) = self.items.write() {
            items.insert(report_type, rows);
        }
    }

    /// Simulate an unreachable backend.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ReportDataSource for InMemoryReportDataSource {
    async fn fetch_items(
        &self,
        report_type: ReportType,
        filters: &ReportFilters,
    ) -> Result<Vec<ReportItem>, DataSourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            tracing::warn!(report_type = %report_type, "In-memory data source marked unavailable");
            return Err(DataSourceError::Unavailable(
                "data source is offline".to_string(),
            ));
        }

        let items = self
            .items
            .read()
            .map_err(|_| DataSourceError::Query("fixture lock poisoned".to_string()))?;

        Ok(items
            .get(&report_type)
            .map(|rows| rows.iter().filter(|i| filters.matches(i)).cloned().collect())
            .unwrap_or_default())
    }
}
