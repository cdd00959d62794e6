//! Database metrics.
//!
//! Per-query latency histograms and connection pool gauges, exported
//! through the process-wide `metrics` recorder.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Connection pool occupancy at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub active: u32,
    pub max: u32,
}

impl PoolStats {
    fn new(size: u32, idle: usize, max: u32) -> Self {
        let idle = u32::try_from(idle).unwrap_or(u32::MAX).min(size);
        Self {
            size,
            idle,
            active: size - idle,
            max,
        }
    }

    /// Every connection the pool may open is checked out.
    pub fn is_saturated(&self) -> bool {
        self.active >= self.max
    }
}

/// Sample the pool and publish its gauges.
pub fn record_pool_metrics(pool: &PgPool) -> PoolStats {
    let stats = PoolStats::new(
        pool.size(),
        pool.num_idle(),
        pool.options().get_max_connections(),
    );

    gauge!("database_connections_active").set(f64::from(stats.active));
    gauge!("database_connections_idle").set(f64::from(stats.idle));
    gauge!("database_connections_total").set(f64::from(stats.size));
    gauge!("database_connections_max").set(f64::from(stats.max));

    stats
}

/// Times one repository query.
///
/// ```ignore
/// let timer = QueryTimer::new("claim_report_schedule");
/// let row = sqlx::query_as::<_, ReportScheduleEntity>(...).fetch_optional(&pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    query: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        histogram!("database_query_duration_seconds", "query" => self.query)
            .record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_active_connections() {
        let stats = PoolStats::new(8, 3, 20);
        assert_eq!(stats.active, 5);
        assert!(!stats.is_saturated());
    }

    #[test]
    fn test_pool_stats_saturated() {
        let stats = PoolStats::new(20, 0, 20);
        assert_eq!(stats.active, 20);
        assert!(stats.is_saturated());
    }

    #[test]
    fn test_pool_stats_idle_never_exceeds_size() {
        let stats = PoolStats::new(2, 5, 10);
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.active, 0);
    }

    #[test]
    fn test_query_timer_records_without_recorder() {
        let timer = QueryTimer::new("claim_report_schedule");
        assert_eq!(timer.query, "claim_report_schedule");
        timer.record();
    }
}
