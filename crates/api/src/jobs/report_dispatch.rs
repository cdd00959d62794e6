//! Clock-driven report dispatch.

use chrono::Utc;

use crate::services::Dispatcher;

use super::scheduler::{Job, JobFrequency};

/// Runs one dispatcher tick per poll interval.
pub struct ReportDispatchJob {
    dispatcher: Dispatcher,
    poll_interval_secs: u64,
}

impl ReportDispatchJob {
    pub fn new(dispatcher: Dispatcher, poll_interval_secs: u64) -> Self {
        Self {
            dispatcher,
            poll_interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for ReportDispatchJob {
    fn name(&self) -> &'static str {
        "report_dispatch"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.poll_interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        self.dispatcher
            .tick(Utc::now())
            .await
            .map(|_| ())
            .map_err(|e| format!("Dispatch tick failed: {}", e))
    }
}
