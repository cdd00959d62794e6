//! Report schedule entity (database row mapping).

use chrono::{DateTime, NaiveTime, Utc};
use domain::models::ReportSchedule;
use domain::services::StoreError;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Column list shared by every query returning a schedule row.
pub const REPORT_SCHEDULE_COLUMNS: &str = "id, report_name, report_type, frequency, \
    frequency_day, frequency_month, scheduled_time, email_recipients, filters, format, \
    include_list, is_active, last_sent_at, next_run_at, claimed_occurrence, claim_token, \
    claimed_at, created_by, created_at, updated_at";

/// Database row mapping for the report_schedules table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportScheduleEntity {
    pub id: Uuid,
    pub report_name: String,
    pub report_type: String,
    pub frequency: String,
    pub frequency_day: Option<i32>,
    pub frequency_month: Option<i32>,
    pub scheduled_time: NaiveTime,
    pub email_recipients: Vec<String>,
    pub filters: Value,
    pub format: String,
    pub include_list: bool,
    pub is_active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub claimed_occurrence: Option<DateTime<Utc>>,
    pub claim_token: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ReportScheduleEntity> for ReportSchedule {
    type Error = StoreError;

    fn try_from(entity: ReportScheduleEntity) -> Result<Self, Self::Error> {
        let id = entity.id;
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        let filters = match entity.filters {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => return Err(corrupt(format!("filters is not an object: {}", other))),
        };

        Ok(Self {
            id,
            report_name: entity.report_name,
            report_type: entity.report_type.parse().map_err(corrupt)?,
            frequency: entity.frequency.parse().map_err(corrupt)?,
            frequency_day: entity.frequency_day,
            frequency_month: entity.frequency_month,
            scheduled_time: entity.scheduled_time,
            email_recipients: entity.email_recipients,
            filters,
            format: entity.format.parse().map_err(corrupt)?,
            include_list: entity.include_list,
            is_active: entity.is_active,
            last_sent_at: entity.last_sent_at,
            next_run_at: entity.next_run_at,
            created_by: entity.created_by,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{Frequency, ReportFormat, ReportType};
    use serde_json::json;

    fn entity() -> ReportScheduleEntity {
        ReportScheduleEntity {
            id: Uuid::new_v4(),
            report_name: "Monthly depreciation".to_string(),
            report_type: "depreciation".to_string(),
            frequency: "monthly".to_string(),
            frequency_day: Some(31),
            frequency_month: None,
            scheduled_time: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            email_recipients: vec!["finance@example.com".to_string()],
            filters: json!({ "fullyDepreciated": true }),
            format: "excel".to_string(),
            include_list: true,
            is_active: true,
            last_sent_at: None,
            next_run_at: Some(Utc::now()),
            claimed_occurrence: None,
            claim_token: None,
            claimed_at: None,
            created_by: Some("admin".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_report_schedule_entity_to_domain() {
        let entity = entity();
        let schedule = ReportSchedule::try_from(entity.clone()).unwrap();
        assert_eq!(schedule.id, entity.id);
        assert_eq!(schedule.report_type, ReportType::Depreciation);
        assert_eq!(schedule.frequency, Frequency::Monthly);
        assert_eq!(schedule.format, ReportFormat::Excel);
        assert_eq!(schedule.filters.get("fullyDepreciated"), Some(&json!(true)));
    }

    #[test]
    fn test_unknown_enum_value_is_corrupt() {
        let mut entity = entity();
        entity.report_type = "inventory".to_string();
        let err = ReportSchedule::try_from(entity).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_non_object_filters_are_corrupt() {
        let mut entity = entity();
        entity.filters = json!([1, 2, 3]);
        assert!(ReportSchedule::try_from(entity).is_err());

        let mut entity = self::entity();
        entity.filters = Value::Null;
        assert!(ReportSchedule::try_from(entity).unwrap().filters.is_empty());
    }
}
