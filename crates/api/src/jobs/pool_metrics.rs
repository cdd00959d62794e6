//! Connection pool sampling. Registered for the postgres backend only.

use sqlx::PgPool;
use tracing::warn;

use super::scheduler::{Job, JobFrequency};

const SAMPLE_INTERVAL_SECS: u64 = 10;

pub struct PoolMetricsJob {
    pool: PgPool,
}

impl PoolMetricsJob {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(SAMPLE_INTERVAL_SECS)
    }

    async fn execute(&self) -> Result<(), String> {
        let stats = persistence::metrics::record_pool_metrics(&self.pool);
        if stats.is_saturated() {
            warn!(
                active = stats.active,
                max = stats.max,
                "Database pool saturated; dispatch and API queries are queueing"
            );
        }
        Ok(())
    }
}
