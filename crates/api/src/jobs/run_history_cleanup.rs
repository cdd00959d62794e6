//! Background job to purge old run history.

use chrono::{Duration, Utc};
use domain::services::ScheduleStore;
use std::sync::Arc;
use tracing::info;

use super::scheduler::{Job, JobFrequency};

/// Deletes run records older than the retention window, once a day.
pub struct RunHistoryCleanupJob {
    store: Arc<dyn ScheduleStore>,
    retention_days: i64,
}

impl RunHistoryCleanupJob {
    pub fn new(store: Arc<dyn ScheduleStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    async fn purge(&self, now: chrono::DateTime<Utc>) -> Result<u64, String> {
        let cutoff = now - Duration::days(self.retention_days);
        let deleted = self
            .store
            .purge_runs_before(cutoff)
            .await
            .map_err(|e| format!("Failed to purge run history: {}", e))?;

        if deleted > 0 {
            info!(deleted = deleted, cutoff = %cutoff, "Purged old report runs");
        }
        Ok(deleted)
    }
}

#[async_trait::async_trait]
impl Job for RunHistoryCleanupJob {
    fn name(&self) -> &'static str {
        "run_history_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Daily
    }

    async fn execute(&self) -> Result<(), String> {
        self.purge(Utc::now()).await.map(|_| ())
    }
}
