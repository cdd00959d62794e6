//! Report run entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{FailureStage, RunRecord};
use domain::services::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the report_runs table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportRunEntity {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub kind: String,
    pub occurrence: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: String,
    pub failure_stage: Option<String>,
    pub error_detail: Option<String>,
    pub artifact_size: Option<i64>,
    pub recipient_count: i32,
}

impl TryFrom<ReportRunEntity> for RunRecord {
    type Error = StoreError;

    fn try_from(entity: ReportRunEntity) -> Result<Self, Self::Error> {
        let id = entity.schedule_id;
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        Ok(Self {
            id: entity.id,
            schedule_id: entity.schedule_id,
            kind: entity.kind.parse().map_err(corrupt)?,
            occurrence: entity.occurrence,
            started_at: entity.started_at,
            finished_at: entity.finished_at,
            outcome: entity.outcome.parse().map_err(corrupt)?,
            failure_stage: entity
                .failure_stage
                .map(|s| s.parse::<FailureStage>())
                .transpose()
                .map_err(corrupt)?,
            error_detail: entity.error_detail,
            artifact_size: entity.artifact_size,
            recipient_count: entity.recipient_count,
        })
    }
}
