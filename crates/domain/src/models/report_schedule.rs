//! Report schedule domain model.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::validation::{validate_recipients, validate_time_of_day};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::services::recurrence::{FrequencyDescriptor, FrequencyError};

/// Kind of report a schedule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Assets,
    Checkout,
    Location,
    Maintenance,
    Audit,
    Depreciation,
    Lease,
    Reservation,
    Transaction,
}

impl ReportType {
    pub const ALL: [ReportType; 9] = [
        ReportType::Assets,
        ReportType::Checkout,
        ReportType::Location,
        ReportType::Maintenance,
        ReportType::Audit,
        ReportType::Depreciation,
        ReportType::Lease,
        ReportType::Reservation,
        ReportType::Transaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assets => "assets",
            Self::Checkout => "checkout",
            Self::Location => "location",
            Self::Maintenance => "maintenance",
            Self::Audit => "audit",
            Self::Depreciation => "depreciation",
            Self::Lease => "lease",
            Self::Reservation => "reservation",
            Self::Transaction => "transaction",
        }
    }

    /// Human-readable title used in documents and email subjects.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Assets => "Assets",
            Self::Checkout => "Checkout",
            Self::Location => "Location",
            Self::Maintenance => "Maintenance",
            Self::Audit => "Audit",
            Self::Depreciation => "Depreciation",
            Self::Lease => "Lease",
            Self::Reservation => "Reservation",
            Self::Transaction => "Transaction",
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown report type: {}", s))
    }
}

/// Recurrence frequency of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("Unknown frequency: {}", other)),
        }
    }
}

/// Output format of the rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Pdf,
    Csv,
    Excel,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Excel => "excel",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Excel => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "csv" => Ok(Self::Csv),
            "excel" | "xlsx" => Ok(Self::Excel),
            other => Err(format!("Unknown report format: {}", other)),
        }
    }
}

/// A persisted recurring report configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportSchedule {
    pub id: Uuid,
    pub report_name: String,
    pub report_type: ReportType,
    pub frequency: Frequency,
    /// Weekday 0-6 (Sunday = 0) for weekly, day of month 1-31 otherwise.
    pub frequency_day: Option<i32>,
    /// Month 1-12, yearly only.
    pub frequency_month: Option<i32>,
    pub scheduled_time: NaiveTime,
    pub email_recipients: Vec<String>,
    /// Passed verbatim to the report generator.
    pub filters: Map<String, Value>,
    pub format: ReportFormat,
    pub include_list: bool,
    pub is_active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportSchedule {
    /// Build the recurrence descriptor from the stored frequency fields.
    pub fn descriptor(&self) -> Result<FrequencyDescriptor, FrequencyError> {
        FrequencyDescriptor::from_parts(
            self.frequency,
            self.frequency_day,
            self.frequency_month,
            self.scheduled_time,
        )
    }

    /// Whether the dispatcher should consider this schedule at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_run_at.is_some_and(|next| next <= now)
    }
}

fn default_format() -> ReportFormat {
    ReportFormat::Pdf
}

fn default_active() -> bool {
    true
}

/// Request payload for creating a report schedule.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateReportScheduleRequest {
    #[validate(length(min = 1, max = 200, message = "Report name must be 1-200 characters"))]
    pub report_name: String,

    pub report_type: ReportType,

    pub frequency: Frequency,

    #[serde(default)]
    pub frequency_day: Option<i32>,

    #[serde(default)]
    pub frequency_month: Option<i32>,

    #[validate(custom(function = "validate_time_of_day"))]
    pub scheduled_time: String,

    #[validate(custom(function = "validate_recipients"))]
    pub email_recipients: Vec<String>,

    #[serde(default)]
    pub filters: Map<String, Value>,

    #[serde(default = "default_format")]
    pub format: ReportFormat,

    #[serde(default)]
    pub include_list: bool,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Request payload for updating a report schedule (partial update).
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct UpdateReportScheduleRequest {
    #[validate(length(min = 1, max = 200, message = "Report name must be 1-200 characters"))]
    pub report_name: Option<String>,

    pub report_type: Option<ReportType>,

    pub frequency: Option<Frequency>,

    pub frequency_day: Option<i32>,

    pub frequency_month: Option<i32>,

    #[validate(custom(function = "validate_time_of_day"))]
    pub scheduled_time: Option<String>,

    #[validate(custom(function = "validate_recipients"))]
    pub email_recipients: Option<Vec<String>>,

    pub filters: Option<Map<String, Value>>,

    pub format: Option<ReportFormat>,

    pub include_list: Option<bool>,

    pub is_active: Option<bool>,
}

/// Request payload for a test send.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct TestSendRequest {
    /// Deliver only to these addresses instead of the schedule's recipients.
    #[serde(default)]
    #[validate(custom(function = "validate_recipients"))]
    pub recipients: Option<Vec<String>>,
}

/// Response payload for schedule operations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportScheduleResponse {
    pub id: Uuid,
    pub report_name: String,
    pub report_type: ReportType,
    pub frequency: Frequency,
    pub frequency_day: Option<i32>,
    pub frequency_month: Option<i32>,
    pub scheduled_time: String,
    pub schedule_description: String,
    pub email_recipients: Vec<String>,
    pub filters: Map<String, Value>,
    pub format: ReportFormat,
    pub include_list: bool,
    pub is_active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReportSchedule> for ReportScheduleResponse {
    fn from(s: ReportSchedule) -> Self {
        let schedule_description = s
            .descriptor()
            .map(|d| d.describe())
            .unwrap_or_else(|e| format!("Invalid schedule: {}", e));
        Self {
            id: s.id,
            report_name: s.report_name,
            report_type: s.report_type,
            frequency: s.frequency,
            frequency_day: s.frequency_day,
            frequency_month: s.frequency_month,
            scheduled_time: s.scheduled_time.format("%H:%M").to_string(),
            schedule_description,
            email_recipients: s.email_recipients,
            filters: s.filters,
            format: s.format,
            include_list: s.include_list,
            is_active: s.is_active,
            last_sent_at: s.last_sent_at,
            next_run_at: s.next_run_at,
            created_by: s.created_by,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Response for listing schedules.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ListReportSchedulesResponse {
    pub schedules: Vec<ReportScheduleResponse>,
    pub total: i64,
}

/// Query parameters for listing schedules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListReportSchedulesQuery {
    pub active: Option<bool>,
    pub report_type: Option<ReportType>,
}
