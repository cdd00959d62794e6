//! Report dispatcher.
//!
//! Each tick lists due schedules, claims them one by one and, for every
//! claim won, generates the report, mails it and records the outcome.
//! Schedules are processed in parallel up to `max_concurrency`; one
//! schedule's failure never affects another's.
//!
//! "Run now" and "test send" share the generate-and-send path but bypass
//! claiming and never advance `last_sent_at` or `next_run_at`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use domain::models::{FailureStage, ReportSchedule, RunKind, RunRecord};
use domain::services::{
    next_run, Claim, ClaimOutcome, OutcomeUpdate, ScheduleStore, StoreError,
};
use shared::validation::normalize_recipients;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::middleware::metrics::{
    record_artifact_size, record_claim_lost, record_dispatch_tick, record_report_run,
};
use crate::services::email::{send_with_timeout, EmailMessage, Mailer};
use crate::services::report_generation::{
    GeneratedReport, ReportGenerationError, ReportGenerator,
};

/// Subject prefix marking diagnostic sends.
pub const TEST_SUBJECT_PREFIX: &str = "[TEST] ";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Report schedule not found: {0}")]
    NotFound(Uuid),

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => DispatchError::NotFound(id),
            other => DispatchError::Store(other),
        }
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub max_concurrency: usize,
    pub send_timeout: Duration,
    pub subject_prefix: String,
}

/// Counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Claimed by another dispatcher or gone before we got to it.
    pub skipped: usize,
}

enum Processed {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn ScheduleStore>,
    generator: ReportGenerator,
    mailer: Arc<dyn Mailer>,
    tz: Tz,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        generator: ReportGenerator,
        mailer: Arc<dyn Mailer>,
        tz: Tz,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            generator,
            mailer,
            tz,
            settings,
        }
    }

    /// Process every schedule due at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, DispatchError> {
        let started = Instant::now();
        let due = self.store.list_due(now).await?;
        let mut summary = TickSummary {
            due: due.len(),
            ..TickSummary::default()
        };

        if due.is_empty() {
            debug!("No report schedules due");
            record_dispatch_tick(started.elapsed().as_secs_f64());
            return Ok(summary);
        }

        info!(due = due.len(), "Dispatching due report schedules");

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(due.len());
        for id in due {
            let permit = semaphore.clone().acquire_owned().await.ok();
            let dispatcher = self.clone();
            handles.push((
                id,
                tokio::spawn(async move {
                    let _permit = permit;
                    dispatcher.process_due(id, elapsed_since(now, started)).await
                }),
            ));
        }

        for (id, handle) in handles {
            match handle.await {
                Ok(Processed::Succeeded) => summary.succeeded += 1,
                Ok(Processed::Failed) => summary.failed += 1,
                Ok(Processed::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(schedule_id = %id, error = %e, "Dispatch task panicked");
                    summary.failed += 1;
                }
            }
        }

        let elapsed = started.elapsed();
        record_dispatch_tick(elapsed.as_secs_f64());
        info!(
            due = summary.due,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = elapsed.as_millis() as u64,
            "Dispatch tick finished"
        );

        Ok(summary)
    }

    /// `now` is the claim time: the tick's clock plus however long this
    /// schedule waited for a worker. The lease runs from it.
    async fn process_due(&self, id: Uuid, now: DateTime<Utc>) -> Processed {
        let claim = match self.store.claim(id, now).await {
            Ok(ClaimOutcome::Claimed(claim)) => claim,
            Ok(ClaimOutcome::AlreadyClaimed) => {
                debug!(schedule_id = %id, "Schedule already claimed, skipping");
                record_claim_lost();
                return Processed::Skipped;
            }
            Ok(ClaimOutcome::NotFound) => {
                debug!(schedule_id = %id, "Schedule vanished before claim, skipping");
                return Processed::Skipped;
            }
            Err(e) => {
                error!(schedule_id = %id, error = %e, "Failed to claim schedule");
                return Processed::Failed;
            }
        };

        let schedule = &claim.schedule;
        let run = self
            .execute(schedule, RunKind::Scheduled, &schedule.email_recipients, "", now)
            .await
            .with_occurrence(claim.occurrence);
        let succeeded = run.is_success();

        let update = OutcomeUpdate {
            next_run_at: self.next_occurrence(&claim, now),
            last_sent_at: succeeded.then_some(run.finished_at),
            run,
        };
        self.record(&claim, update).await;

        if succeeded {
            Processed::Succeeded
        } else {
            Processed::Failed
        }
    }

    /// Next occurrence strictly after both `now` and the one just fired.
    fn next_occurrence(&self, claim: &Claim, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match claim.schedule.descriptor() {
            Ok(descriptor) => next_run(&descriptor, now.max(claim.occurrence), &self.tz),
            Err(e) => {
                warn!(
                    schedule_id = %claim.schedule.id,
                    error = %e,
                    "Schedule has invalid frequency fields, not rescheduling"
                );
                None
            }
        }
    }

    async fn record(&self, claim: &Claim, update: OutcomeUpdate) {
        let id = claim.schedule.id;
        let next_run_at = update.next_run_at;
        match self.store.record_outcome(claim, update).await {
            Ok(true) => debug!(
                schedule_id = %id,
                next_run_at = ?next_run_at,
                "Outcome recorded"
            ),
            Ok(false) => info!(
                schedule_id = %id,
                "Schedule changed during run, keeping its new next run"
            ),
            Err(e) => error!(schedule_id = %id, error = %e, "Failed to record run outcome"),
        }
    }

    /// Generate and send once, outside the occurrence bookkeeping.
    pub async fn run_now(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(ReportSchedule, RunRecord), DispatchError> {
        let schedule = self.load(id).await?;
        let run = self
            .execute(&schedule, RunKind::RunNow, &schedule.email_recipients, "", now)
            .await;
        self.store.insert_run(&run).await?;
        Ok((schedule, run))
    }

    /// Diagnostic send, optionally to other recipients than the schedule's.
    pub async fn send_test(
        &self,
        id: Uuid,
        recipients: Option<Vec<String>>,
        now: DateTime<Utc>,
    ) -> Result<(ReportSchedule, RunRecord), DispatchError> {
        let recipients = match recipients {
            Some(list) => {
                let normalized = normalize_recipients(&list);
                if normalized.is_empty() {
                    return Err(DispatchError::InvalidRequest(
                        "At least one recipient is required".to_string(),
                    ));
                }
                Some(normalized)
            }
            None => None,
        };

        let schedule = self.load(id).await?;
        let recipients = recipients.unwrap_or_else(|| schedule.email_recipients.clone());
        let run = self
            .execute(&schedule, RunKind::Test, &recipients, TEST_SUBJECT_PREFIX, now)
            .await;
        self.store.insert_run(&run).await?;
        Ok((schedule, run))
    }

    async fn load(&self, id: Uuid) -> Result<ReportSchedule, DispatchError> {
        self.store
            .get(id)
            .await?
            .ok_or(DispatchError::NotFound(id))
    }

    /// Generate, render and send; every failure becomes a failed run record.
    async fn execute(
        &self,
        schedule: &ReportSchedule,
        kind: RunKind,
        recipients: &[String],
        subject_marker: &str,
        started_at: DateTime<Utc>,
    ) -> RunRecord {
        let clock = Instant::now();
        let finished = |clock: Instant| elapsed_since(started_at, clock);
        let fail = |stage: FailureStage, detail: String, clock: Instant| {
            warn!(
                schedule_id = %schedule.id,
                kind = %kind,
                stage = %stage,
                error = %detail,
                "Report run failed"
            );
            record_report_run(kind, domain::models::RunOutcome::Failure);
            RunRecord::failure(
                schedule.id,
                kind,
                started_at,
                finished(clock),
                stage,
                detail,
                recipients.len(),
            )
        };

        if recipients.is_empty() {
            return fail(
                FailureStage::Configuration,
                "Schedule has no recipients".to_string(),
                clock,
            );
        }

        let report = match self.generator.generate(schedule, started_at).await {
            Ok(report) => report,
            Err(e @ ReportGenerationError::DataSource(_)) => {
                return fail(FailureStage::Generation, e.to_string(), clock)
            }
            Err(e @ ReportGenerationError::Render(_)) => {
                return fail(FailureStage::Rendering, e.to_string(), clock)
            }
        };
        let size = report.artifact.size();
        record_artifact_size(size);

        let message = EmailMessage {
            recipients: recipients.to_vec(),
            subject: self.subject(schedule, subject_marker),
            body_text: email_body(schedule, &report),
            attachment: report.artifact,
        };

        if let Err(e) =
            send_with_timeout(self.mailer.as_ref(), &message, self.settings.send_timeout).await
        {
            return fail(FailureStage::Delivery, e.to_string(), clock).with_artifact_size(size);
        }

        info!(
            schedule_id = %schedule.id,
            kind = %kind,
            recipients = recipients.len(),
            bytes = size,
            "Report sent"
        );
        record_report_run(kind, domain::models::RunOutcome::Success);
        RunRecord::success(
            schedule.id,
            kind,
            started_at,
            finished(clock),
            size,
            recipients.len(),
        )
    }

    fn subject(&self, schedule: &ReportSchedule, marker: &str) -> String {
        format!(
            "{}{}{} ({} report)",
            marker,
            self.settings.subject_prefix,
            schedule.report_name,
            schedule.report_type.title()
        )
    }
}

/// `base` advanced by the wall time elapsed since `clock`.
fn elapsed_since(base: DateTime<Utc>, clock: Instant) -> DateTime<Utc> {
    base + chrono::Duration::from_std(clock.elapsed()).unwrap_or_else(|_| chrono::Duration::zero())
}

fn email_body(schedule: &ReportSchedule, report: &GeneratedReport) -> String {
    let cadence = schedule
        .descriptor()
        .map(|d| d.describe())
        .unwrap_or_else(|_| schedule.frequency.to_string());

    format!(
        "Hello,\n\n\
         Please find attached the \"{name}\" report.\n\n\
         Report type: {report_type}\n\
         Generated at: {generated}\n\
         Total items: {items}\n\
         Total value: {value:.2}\n\
         Format: {format}\n\n\
         Schedule: {cadence}\n",
        name = schedule.report_name,
        report_type = schedule.report_type.title(),
        generated = report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        items = report.total_items,
        value = report.total_value.round_dp(2),
        format = report.format.as_str().to_uppercase(),
        cadence = cadence,
    )
}
