//! Schedule manager.
//!
//! The CRUD surface behind the HTTP routes. Every mutation that touches the
//! frequency fields recomputes `next_run_at` through the recurrence
//! calculator; everything else leaves it alone.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use shared::validation::{normalize_recipients, parse_time_of_day};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::models::{
    CreateReportScheduleRequest, Frequency, ListReportSchedulesQuery, ReportSchedule, RunRecord,
    UpdateReportScheduleRequest,
};
use crate::services::recurrence::{next_run, FrequencyDescriptor, FrequencyError};
use crate::services::schedule_store::{
    ScheduleListFilter, ScheduleStore, StoreError, UpdateScope,
};

/// Upper bound for run history listings.
pub const MAX_RUNS_LIMIT: i64 = 200;

/// Schedule manager failure.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{0}")]
    Validation(String),

    #[error("Report schedule not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(StoreError),
}

impl From<FrequencyError> for ScheduleError {
    fn from(err: FrequencyError) -> Self {
        ScheduleError::Validation(err.to_string())
    }
}

impl From<ValidationErrors> for ScheduleError {
    fn from(errors: ValidationErrors) -> Self {
        ScheduleError::Validation(describe_validation_errors(&errors))
    }
}

impl From<StoreError> for ScheduleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ScheduleError::NotFound(id),
            other => ScheduleError::Store(other),
        }
    }
}

/// Flatten validator errors into one readable sentence, fields sorted.
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<(String, String)> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            })
        })
        .collect();
    messages.sort();
    messages
        .into_iter()
        .map(|(_, m)| m)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Frequency fields a frequency actually uses; the rest are cleared.
fn normalize_frequency_fields(
    frequency: Frequency,
    day: Option<i32>,
    month: Option<i32>,
) -> (Option<i32>, Option<i32>) {
    match frequency {
        Frequency::Daily => (None, None),
        Frequency::Weekly | Frequency::Monthly => (day, None),
        Frequency::Yearly => (day, month),
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, ScheduleError> {
    parse_time_of_day(value).ok_or_else(|| {
        ScheduleError::Validation("Scheduled time must be formatted as HH:MM".to_string())
    })
}

fn normalize_name(name: &str) -> Result<String, ScheduleError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ScheduleError::Validation(
            "Report name must not be blank".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// CRUD operations on report schedules.
#[derive(Clone)]
pub struct ScheduleManager {
    store: Arc<dyn ScheduleStore>,
    tz: Tz,
}

impl ScheduleManager {
    pub fn new(store: Arc<dyn ScheduleStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    fn first_run(
        &self,
        descriptor: &FrequencyDescriptor,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        next_run(descriptor, now, &self.tz).ok_or_else(|| {
            ScheduleError::Validation("Schedule has no future occurrence".to_string())
        })
    }

    /// Validate and persist a new schedule with its first `next_run_at`.
    pub async fn create(
        &self,
        request: CreateReportScheduleRequest,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReportSchedule, ScheduleError> {
        request.validate()?;

        let report_name = normalize_name(&request.report_name)?;
        let scheduled_time = parse_time(&request.scheduled_time)?;
        let (frequency_day, frequency_month) = normalize_frequency_fields(
            request.frequency,
            request.frequency_day,
            request.frequency_month,
        );
        let descriptor = FrequencyDescriptor::from_parts(
            request.frequency,
            frequency_day,
            frequency_month,
            scheduled_time,
        )?;
        let next_run_at = self.first_run(&descriptor, now)?;

        let schedule = ReportSchedule {
            id: Uuid::new_v4(),
            report_name,
            report_type: request.report_type,
            frequency: request.frequency,
            frequency_day,
            frequency_month,
            scheduled_time: descriptor.time,
            email_recipients: normalize_recipients(&request.email_recipients),
            filters: request.filters,
            format: request.format,
            include_list: request.include_list,
            is_active: request.is_active,
            last_sent_at: None,
            next_run_at: Some(next_run_at),
            created_by,
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&schedule).await?;

        info!(
            schedule_id = %schedule.id,
            report_type = %schedule.report_type,
            frequency = %schedule.frequency,
            next_run_at = %next_run_at,
            "Report schedule created"
        );

        Ok(schedule)
    }

    pub async fn get(&self, id: Uuid) -> Result<ReportSchedule, ScheduleError> {
        self.store
            .get(id)
            .await?
            .ok_or(ScheduleError::NotFound(id))
    }

    pub async fn list(
        &self,
        query: &ListReportSchedulesQuery,
    ) -> Result<Vec<ReportSchedule>, ScheduleError> {
        let filter = ScheduleListFilter {
            active: query.active,
            report_type: query.report_type,
        };
        Ok(self.store.list(&filter).await?)
    }

    /// Apply a partial update.
    ///
    /// `next_run_at` is recomputed from `now` only when frequency, day,
    /// month or time actually change.
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateReportScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<ReportSchedule, ScheduleError> {
        request.validate()?;
        let mut schedule = self.get(id).await?;

        if let Some(name) = &request.report_name {
            schedule.report_name = normalize_name(name)?;
        }
        if let Some(report_type) = request.report_type {
            schedule.report_type = report_type;
        }
        if let Some(recipients) = &request.email_recipients {
            schedule.email_recipients = normalize_recipients(recipients);
        }
        if let Some(filters) = request.filters {
            schedule.filters = filters;
        }
        if let Some(format) = request.format {
            schedule.format = format;
        }
        if let Some(include_list) = request.include_list {
            schedule.include_list = include_list;
        }
        if let Some(is_active) = request.is_active {
            schedule.is_active = is_active;
        }

        let frequency = request.frequency.unwrap_or(schedule.frequency);
        let scheduled_time = match &request.scheduled_time {
            Some(value) => parse_time(value)?,
            None => schedule.scheduled_time,
        };
        let (frequency_day, frequency_month) = normalize_frequency_fields(
            frequency,
            request.frequency_day.or(schedule.frequency_day),
            request.frequency_month.or(schedule.frequency_month),
        );
        let descriptor = FrequencyDescriptor::from_parts(
            frequency,
            frequency_day,
            frequency_month,
            scheduled_time,
        )?;

        let reschedule = frequency != schedule.frequency
            || frequency_day != schedule.frequency_day
            || frequency_month != schedule.frequency_month
            || descriptor.time != schedule.scheduled_time;

        schedule.frequency = frequency;
        schedule.frequency_day = frequency_day;
        schedule.frequency_month = frequency_month;
        schedule.scheduled_time = descriptor.time;
        if reschedule {
            schedule.next_run_at = Some(self.first_run(&descriptor, now)?);
        }
        schedule.updated_at = now;

        let scope = UpdateScope {
            reschedule,
            set_active: request.is_active.is_some(),
        };
        self.store.update(&schedule, scope).await?;

        info!(
            schedule_id = %id,
            rescheduled = reschedule,
            "Report schedule updated"
        );

        // Re-read so fields the store preserves (next run, last sent) are current.
        self.get(id).await
    }

    /// Flip `is_active`. `next_run_at` is not touched.
    pub async fn toggle_active(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReportSchedule, ScheduleError> {
        let schedule = self
            .store
            .toggle_active(id, now)
            .await?
            .ok_or(ScheduleError::NotFound(id))?;

        info!(schedule_id = %id, is_active = schedule.is_active, "Report schedule toggled");
        Ok(schedule)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ScheduleError> {
        if !self.store.delete(id).await? {
            return Err(ScheduleError::NotFound(id));
        }
        info!(schedule_id = %id, "Report schedule deleted");
        Ok(())
    }

    /// Run history, newest first.
    pub async fn runs(&self, id: Uuid, limit: i64) -> Result<Vec<RunRecord>, ScheduleError> {
        self.get(id).await?;
        Ok(self
            .store
            .list_runs(id, limit.clamp(1, MAX_RUNS_LIMIT))
            .await?)
    }
}
