//! Run history domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// What triggered a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Clock-driven occurrence claimed by the dispatcher.
    Scheduled,
    /// Manual "run now"; does not consume an occurrence.
    RunNow,
    /// Diagnostic test send; does not consume an occurrence.
    Test,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::RunNow => "run_now",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "run_now" => Ok(Self::RunNow),
            "test" => Ok(Self::Test),
            other => Err(format!("Unknown run kind: {}", other)),
        }
    }
}

/// Result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(format!("Unknown run outcome: {}", other)),
        }
    }
}

/// Pipeline stage at which a failed run stopped.
///
/// Recorded for operator diagnosis only; every stage is handled the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Schedule could not be turned into a report request.
    Configuration,
    /// Data source unreachable or query failed.
    Generation,
    /// Document could not be rendered.
    Rendering,
    /// Mail transport rejected or timed out.
    Delivery,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Generation => "generation",
            Self::Rendering => "rendering",
            Self::Delivery => "delivery",
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "configuration" => Ok(Self::Configuration),
            "generation" => Ok(Self::Generation),
            "rendering" => Ok(Self::Rendering),
            "delivery" => Ok(Self::Delivery),
            other => Err(format!("Unknown failure stage: {}", other)),
        }
    }
}

/// Audit entry for one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunRecord {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub kind: RunKind,
    /// Due occurrence this run consumed (scheduled runs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<FailureStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_size: Option<i64>,
    pub recipient_count: i32,
}

impl RunRecord {
    /// Build a successful run record.
    pub fn success(
        schedule_id: Uuid,
        kind: RunKind,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        artifact_size: usize,
        recipient_count: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            kind,
            occurrence: None,
            started_at,
            finished_at,
            outcome: RunOutcome::Success,
            failure_stage: None,
            error_detail: None,
            artifact_size: Some(artifact_size as i64),
            recipient_count: recipient_count as i32,
        }
    }

    /// Build a failed run record.
    pub fn failure(
        schedule_id: Uuid,
        kind: RunKind,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        stage: FailureStage,
        detail: impl Into<String>,
        recipient_count: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            kind,
            occurrence: None,
            started_at,
            finished_at,
            outcome: RunOutcome::Failure,
            failure_stage: Some(stage),
            error_detail: Some(detail.into()),
            artifact_size: None,
            recipient_count: recipient_count as i32,
        }
    }

    pub fn with_occurrence(mut self, occurrence: DateTime<Utc>) -> Self {
        self.occurrence = Some(occurrence);
        self
    }

    /// Record the size of an artifact that was rendered before delivery failed.
    pub fn with_artifact_size(mut self, size: usize) -> Self {
        self.artifact_size = Some(size as i64);
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }
}

/// Response for listing run history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ListRunsResponse {
    pub runs: Vec<RunRecord>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_string_round_trip() {
        for kind in [RunKind::Scheduled, RunKind::RunNow, RunKind::Test] {
            assert_eq!(kind.as_str().parse::<RunKind>().unwrap(), kind);
        }
        for stage in [
            FailureStage::Configuration,
            FailureStage::Generation,
            FailureStage::Rendering,
            FailureStage::Delivery,
        ] {
            assert_eq!(stage.as_str().parse::<FailureStage>().unwrap(), stage);
        }
        assert_eq!("failure".parse::<RunOutcome>().unwrap(), RunOutcome::Failure);
    }

    #[test]
    fn test_failure_record_serialization() {
        let now = Utc::now();
        let record = RunRecord::failure(
            Uuid::new_v4(),
            RunKind::Scheduled,
            now,
            now,
            FailureStage::Delivery,
            "smtp timeout",
            2,
        )
        .with_occurrence(now);

        assert!(!record.is_success());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"outcome\":\"failure\""));
        assert!(json.contains("\"failure_stage\":\"delivery\""));
        assert!(json.contains("\"error_detail\":\"smtp timeout\""));
        assert!(!json.contains("artifact_size"));
    }

    #[test]
    fn test_success_record() {
        let now = Utc::now();
        let record = RunRecord::success(Uuid::new_v4(), RunKind::Test, now, now, 1024, 3);
        assert!(record.is_success());
        assert_eq!(record.artifact_size, Some(1024));
        assert_eq!(record.recipient_count, 3);
        assert!(record.occurrence.is_none());
    }
}
