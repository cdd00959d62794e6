//! Report item repository: the read-only query behind report generation.

use domain::models::{ReportFilters, ReportItem, ReportType};
use domain::services::{DataSourceError, ReportDataSource};
use sqlx::PgPool;

use crate::entities::ReportItemEntity;
use crate::metrics::QueryTimer;

/// Map connectivity failures to `Unavailable`, everything else to `Query`.
fn data_source_error(err: sqlx::Error) -> DataSourceError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => DataSourceError::Unavailable(err.to_string()),
        other => DataSourceError::Query(other.to_string()),
    }
}

fn lowercase(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_lowercase()).collect()
}

/// Repository for report item queries.
#[derive(Clone)]
pub struct ReportItemRepository {
    pool: PgPool,
}

impl ReportItemRepository {
    /// Creates a new ReportItemRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReportDataSource for ReportItemRepository {
    async fn fetch_items(
        &self,
        report_type: ReportType,
        filters: &ReportFilters,
    ) -> Result<Vec<ReportItem>, DataSourceError> {
        let timer = QueryTimer::new("fetch_report_items");

        let result = sqlx::query_as::<_, ReportItemEntity>(
            r#"
            SELECT id, reference, name, status, category, location, site, department,
                   assignee, cost, value, item_date, fully_depreciated
            FROM report_items
            WHERE report_type = $1
              AND (cardinality($2::TEXT[]) = 0 OR LOWER(TRIM(status)) = ANY($2))
              AND (cardinality($3::TEXT[]) = 0 OR LOWER(TRIM(category)) = ANY($3))
              AND (cardinality($4::TEXT[]) = 0 OR LOWER(TRIM(location)) = ANY($4))
              AND (cardinality($5::TEXT[]) = 0 OR LOWER(TRIM(site)) = ANY($5))
              AND (cardinality($6::TEXT[]) = 0 OR LOWER(TRIM(department)) = ANY($6))
              AND ($7::DATE IS NULL OR item_date >= $7)
              AND ($8::DATE IS NULL OR item_date <= $8)
              AND ($9::NUMERIC IS NULL OR cost >= $9)
              AND ($10::NUMERIC IS NULL OR cost <= $10)
              AND ($11::BOOLEAN IS NULL OR fully_depreciated = $11)
            ORDER BY reference, id
            "#,
        )
        .bind(report_type.as_str())
        .bind(lowercase(&filters.statuses))
        .bind(lowercase(&filters.categories))
        .bind(lowercase(&filters.locations))
        .bind(lowercase(&filters.sites))
        .bind(lowercase(&filters.departments))
        .bind(filters.date_from)
        .bind(filters.date_to)
        .bind(filters.min_cost)
        .bind(filters.max_cost)
        .bind(filters.fully_depreciated)
        .fetch_all(&self.pool)
        .await;

        timer.record();

        let items: Vec<ReportItem> = result
            .map_err(data_source_error)?
            .into_iter()
            .map(Into::into)
            .collect();

        tracing::debug!(
            report_type = %report_type,
            rows = items.len(),
            "Fetched report items"
        );

        Ok(items)
    }
}
