//! Report generation service.
//!
//! Fetches items from the data source, aggregates them into a
//! `ReportDocument` and renders the artifact in the requested format.

use chrono::{DateTime, Utc};
use domain::models::{ReportFilters, ReportFormat, ReportSchedule};
use domain::services::{build_document, DataSourceError, ItemizedOptions, ReportDataSource};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::ReportsConfig;
use crate::services::render::{self, Artifact, RenderError};

/// Report generation errors.
#[derive(Debug, Error)]
pub enum ReportGenerationError {
    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Document summary carried into the email body.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub artifact: Artifact,
    pub generated_at: DateTime<Utc>,
    pub total_items: u64,
    pub total_value: rust_decimal::Decimal,
    pub format: ReportFormat,
}

/// Service for generating report artifacts.
#[derive(Clone)]
pub struct ReportGenerator {
    data_source: Arc<dyn ReportDataSource>,
    config: ReportsConfig,
}

impl ReportGenerator {
    pub fn new(data_source: Arc<dyn ReportDataSource>, config: ReportsConfig) -> Self {
        Self {
            data_source,
            config,
        }
    }

    /// Generate and render the report a schedule describes.
    ///
    /// An empty result set is not an error; it renders a "no data" artifact.
    pub async fn generate(
        &self,
        schedule: &ReportSchedule,
        generated_at: DateTime<Utc>,
    ) -> Result<GeneratedReport, ReportGenerationError> {
        let filters = ReportFilters::parse(schedule.report_type, &schedule.filters);
        let items = self
            .data_source
            .fetch_items(schedule.report_type, &filters)
            .await?;

        let document = build_document(
            schedule.report_type,
            &filters,
            items,
            ItemizedOptions {
                include_list: schedule.include_list,
                max_rows: self.config.max_itemized_rows,
            },
            generated_at,
        );

        let artifact = render::render(&document, schedule.format, &self.config.organization_name)?;

        debug!(
            schedule_id = %schedule.id,
            report_type = %schedule.report_type,
            format = %schedule.format,
            total_items = document.totals.total_items,
            omitted_items = document.omitted_items,
            bytes = artifact.size(),
            "Report rendered"
        );

        Ok(GeneratedReport {
            artifact,
            generated_at,
            total_items: document.totals.total_items,
            total_value: document.totals.total_value,
            format: schedule.format,
        })
    }
}
