//! Report schedule repository.
//!
//! PostgreSQL implementation of the `ScheduleStore` contract. The claim is a
//! single conditional UPDATE: under READ COMMITTED, a concurrent claimer
//! blocks on the row lock and re-evaluates the WHERE clause against the
//! committed row, so exactly one caller gets the row back.

use chrono::{DateTime, Duration, Utc};
use domain::models::{ReportSchedule, RunRecord};
use domain::services::{
    Claim, ClaimOutcome, OutcomeUpdate, ScheduleListFilter, ScheduleStore, StoreError,
    UpdateScope,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{ReportRunEntity, ReportScheduleEntity, REPORT_SCHEDULE_COLUMNS};
use crate::metrics::QueryTimer;

fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn to_domain(entity: ReportScheduleEntity) -> Result<ReportSchedule, StoreError> {
    ReportSchedule::try_from(entity)
}

/// Repository for report schedules and their run history.
#[derive(Clone)]
pub struct ReportScheduleRepository {
    pool: PgPool,
    lease: Duration,
}

impl ReportScheduleRepository {
    /// Creates a new repository with the given pool and claim lease.
    pub fn new(pool: PgPool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ScheduleStore for ReportScheduleRepository {
    async fn insert(&self, schedule: &ReportSchedule) -> Result<(), StoreError> {
        let timer = QueryTimer::new("insert_report_schedule");

        let result = sqlx::query(
            r#"
            INSERT INTO report_schedules (
                id, report_name, report_type, frequency, frequency_day, frequency_month,
                scheduled_time, email_recipients, filters, format, include_list, is_active,
                last_sent_at, next_run_at, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(schedule.id)
        .bind(&schedule.report_name)
        .bind(schedule.report_type.as_str())
        .bind(schedule.frequency.as_str())
        .bind(schedule.frequency_day)
        .bind(schedule.frequency_month)
        .bind(schedule.scheduled_time)
        .bind(&schedule.email_recipients)
        .bind(serde_json::Value::Object(schedule.filters.clone()))
        .bind(schedule.format.as_str())
        .bind(schedule.include_list)
        .bind(schedule.is_active)
        .bind(schedule.last_sent_at)
        .bind(schedule.next_run_at)
        .bind(&schedule.created_by)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await;

        timer.record();
        result.map_err(db_error)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReportSchedule>, StoreError> {
        let timer = QueryTimer::new("get_report_schedule");

        let sql = format!(
            "SELECT {} FROM report_schedules WHERE id = $1",
            REPORT_SCHEDULE_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportScheduleEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        timer.record();
        result.map_err(db_error)?.map(to_domain).transpose()
    }

    async fn list(&self, filter: &ScheduleListFilter) -> Result<Vec<ReportSchedule>, StoreError> {
        let timer = QueryTimer::new("list_report_schedules");

        let sql = format!(
            r#"
            SELECT {}
            FROM report_schedules
            WHERE ($1::BOOLEAN IS NULL OR is_active = $1)
              AND ($2::TEXT IS NULL OR report_type = $2)
            ORDER BY created_at DESC, id
            "#,
            REPORT_SCHEDULE_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportScheduleEntity>(&sql)
            .bind(filter.active)
            .bind(filter.report_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await;

        timer.record();
        result
            .map_err(db_error)?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn update(
        &self,
        schedule: &ReportSchedule,
        scope: UpdateScope,
    ) -> Result<(), StoreError> {
        let timer = QueryTimer::new("update_report_schedule");

        let result = sqlx::query(
            r#"
            UPDATE report_schedules
            SET report_name = $2,
                report_type = $3,
                frequency = $4,
                frequency_day = $5,
                frequency_month = $6,
                scheduled_time = $7,
                email_recipients = $8,
                filters = $9,
                format = $10,
                include_list = $11,
                is_active = CASE WHEN $12 THEN $13 ELSE is_active END,
                updated_at = $14,
                next_run_at = CASE WHEN $15 THEN $16 ELSE next_run_at END
            WHERE id = $1
            "#,
        )
        .bind(schedule.id)
        .bind(&schedule.report_name)
        .bind(schedule.report_type.as_str())
        .bind(schedule.frequency.as_str())
        .bind(schedule.frequency_day)
        .bind(schedule.frequency_month)
        .bind(schedule.scheduled_time)
        .bind(&schedule.email_recipients)
        .bind(serde_json::Value::Object(schedule.filters.clone()))
        .bind(schedule.format.as_str())
        .bind(schedule.include_list)
        .bind(scope.set_active)
        .bind(schedule.is_active)
        .bind(schedule.updated_at)
        .bind(scope.reschedule)
        .bind(schedule.next_run_at)
        .execute(&self.pool)
        .await;

        timer.record();
        if result.map_err(db_error)?.rows_affected() == 0 {
            return Err(StoreError::NotFound(schedule.id));
        }
        Ok(())
    }

    async fn toggle_active(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ReportSchedule>, StoreError> {
        let timer = QueryTimer::new("toggle_report_schedule");

        let sql = format!(
            r#"
            UPDATE report_schedules
            SET is_active = NOT is_active, updated_at = $2
            WHERE id = $1
            RETURNING {}
            "#,
            REPORT_SCHEDULE_COLUMNS
        );
        let result = sqlx::query_as::<_, ReportScheduleEntity>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await;

        timer.record();
        result.map_err(db_error)?.map(to_domain).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("delete_report_schedule");

        let result = sqlx::query("DELETE FROM report_schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;

        timer.record();
        Ok(result.map_err(db_error)?.rows_affected() > 0)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let timer = QueryTimer::new("list_due_report_schedules");

        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM report_schedules
            WHERE is_active
              AND next_run_at <= $1
              AND (
                  claim_token IS NULL
                  OR claimed_occurrence IS DISTINCT FROM next_run_at
                  OR claimed_at <= $2
              )
            ORDER BY next_run_at, id
            "#,
        )
        .bind(now)
        .bind(now - self.lease)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result.map_err(db_error)
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<ClaimOutcome, StoreError> {
        let timer = QueryTimer::new("claim_report_schedule");
        let token = Uuid::new_v4();

        let sql = format!(
            r#"
            UPDATE report_schedules
            SET claimed_occurrence = next_run_at,
                claim_token = $3,
                claimed_at = $2
            WHERE id = $1
              AND is_active
              AND next_run_at IS NOT NULL
              AND next_run_at <= $2
              AND (
                  claim_token IS NULL
                  OR claimed_occurrence IS DISTINCT FROM next_run_at
                  OR claimed_at <= $4
              )
            RETURNING {}
            "#,
            REPORT_SCHEDULE_COLUMNS
        );
        let claimed = sqlx::query_as::<_, ReportScheduleEntity>(&sql)
            .bind(id)
            .bind(now)
            .bind(token)
            .bind(now - self.lease)
            .fetch_optional(&self.pool)
            .await;

        let outcome = match claimed.map_err(db_error)? {
            Some(entity) => {
                let occurrence = entity.claimed_occurrence;
                let schedule = to_domain(entity)?;
                match occurrence {
                    Some(occurrence) => ClaimOutcome::Claimed(Box::new(Claim {
                        schedule,
                        token,
                        occurrence,
                        claimed_at: now,
                    })),
                    None => {
                        return Err(StoreError::Corrupt {
                            id,
                            reason: "claim returned without an occurrence".to_string(),
                        })
                    }
                }
            }
            None => {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM report_schedules WHERE id = $1)",
                )
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

                if exists {
                    ClaimOutcome::AlreadyClaimed
                } else {
                    ClaimOutcome::NotFound
                }
            }
        };

        timer.record();
        Ok(outcome)
    }

    async fn record_outcome(
        &self,
        claim: &Claim,
        update: OutcomeUpdate,
    ) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("record_report_outcome");
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Advance only while the claim is held and no edit moved the occurrence.
        let advanced = sqlx::query(
            r#"
            UPDATE report_schedules
            SET next_run_at = $4,
                last_sent_at = COALESCE($5, last_sent_at),
                claimed_occurrence = NULL,
                claim_token = NULL,
                claimed_at = NULL
            WHERE id = $1 AND claim_token = $2 AND next_run_at = $3
            "#,
        )
        .bind(claim.schedule.id)
        .bind(claim.token)
        .bind(claim.occurrence)
        .bind(update.next_run_at)
        .bind(update.last_sent_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?
        .rows_affected()
            > 0;

        if !advanced {
            sqlx::query(
                r#"
                UPDATE report_schedules
                SET claimed_occurrence = NULL, claim_token = NULL, claimed_at = NULL
                WHERE id = $1 AND claim_token = $2
                "#,
            )
            .bind(claim.schedule.id)
            .bind(claim.token)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        insert_run_if_schedule_exists(&mut tx, &update.run).await?;

        tx.commit().await.map_err(db_error)?;
        timer.record();
        Ok(advanced)
    }

    async fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let timer = QueryTimer::new("insert_report_run");
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let inserted = insert_run_if_schedule_exists(&mut tx, run).await?;

        tx.commit().await.map_err(db_error)?;
        timer.record();

        if inserted {
            Ok(())
        } else {
            Err(StoreError::NotFound(run.schedule_id))
        }
    }

    async fn list_runs(&self, schedule_id: Uuid, limit: i64) -> Result<Vec<RunRecord>, StoreError> {
        let timer = QueryTimer::new("list_report_runs");

        let result = sqlx::query_as::<_, ReportRunEntity>(
            r#"
            SELECT id, schedule_id, kind, occurrence, started_at, finished_at, outcome,
                   failure_stage, error_detail, artifact_size, recipient_count
            FROM report_runs
            WHERE schedule_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(schedule_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
            .map_err(db_error)?
            .into_iter()
            .map(RunRecord::try_from)
            .collect()
    }

    async fn purge_runs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let timer = QueryTimer::new("purge_report_runs");

        let result = sqlx::query("DELETE FROM report_runs WHERE finished_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await;

        timer.record();
        Ok(result.map_err(db_error)?.rows_affected())
    }
}

/// Insert a run row unless its schedule has been deleted in the meantime.
async fn insert_run_if_schedule_exists(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    run: &RunRecord,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO report_runs (
            id, schedule_id, kind, occurrence, started_at, finished_at, outcome,
            failure_stage, error_detail, artifact_size, recipient_count
        )
        SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
        WHERE EXISTS (SELECT 1 FROM report_schedules WHERE id = $2)
        "#,
    )
    .bind(run.id)
    .bind(run.schedule_id)
    .bind(run.kind.as_str())
    .bind(run.occurrence)
    .bind(run.started_at)
    .bind(run.finished_at)
    .bind(run.outcome.as_str())
    .bind(run.failure_stage.map(|s| s.as_str()))
    .bind(&run.error_detail)
    .bind(run.artifact_size)
    .bind(run.recipient_count)
    .execute(&mut **tx)
    .await
    .map_err(db_error)?;

    Ok(result.rows_affected() > 0)
}
