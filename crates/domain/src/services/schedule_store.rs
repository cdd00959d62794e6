//! Schedule store contract.
//!
//! Persistence boundary for schedules and run history. The one operation
//! with real concurrency requirements is `claim`: it must be a single atomic
//! read-modify-write so that, across any number of dispatchers, exactly one
//! caller wins a given due occurrence.
//!
//! A claim is recorded on the schedule itself as (occurrence, token,
//! claimed_at). A schedule is claimable when it is active, due, and not
//! already claimed for its current `next_run_at` within the lease window.
//! A claim whose holder died before `record_outcome` becomes claimable again
//! once the lease expires.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{ReportSchedule, ReportType, RunRecord};

/// Default claim lease.
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 900;

/// Store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Schedule not found: {0}")]
    NotFound(Uuid),

    #[error("Corrupt schedule record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// Filter for listing schedules.
#[derive(Debug, Clone, Default)]
pub struct ScheduleListFilter {
    pub active: Option<bool>,
    pub report_type: Option<ReportType>,
}

/// Proof of a successful claim, handed back to `record_outcome`.
#[derive(Debug, Clone)]
pub struct Claim {
    /// Snapshot of the schedule at claim time.
    pub schedule: ReportSchedule,
    pub token: Uuid,
    /// The due `next_run_at` this claim consumes.
    pub occurrence: DateTime<Utc>,
    pub claimed_at: DateTime<Utc>,
}

/// Result of a claim attempt.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(Box<Claim>),
    NotFound,
    /// Another dispatcher holds or already processed this occurrence, or the
    /// schedule is no longer due.
    AlreadyClaimed,
}

/// Durable result of a claimed run.
#[derive(Debug, Clone)]
pub struct OutcomeUpdate {
    pub run: RunRecord,
    pub next_run_at: Option<DateTime<Utc>>,
    /// Set on success only; failures leave `last_sent_at` untouched.
    pub last_sent_at: Option<DateTime<Utc>>,
}

/// Persistence boundary for schedules and run history.
#[async_trait::async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert(&self, schedule: &ReportSchedule) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ReportSchedule>, StoreError>;

    /// Newest first.
    async fn list(&self, filter: &ScheduleListFilter) -> Result<Vec<ReportSchedule>, StoreError>;

    /// Persist user-editable fields of `schedule`.
    ///
    /// `next_run_at` and `is_active` are written only when `scope` says so, so
    /// an edit that leaves them alone never races a dispatcher advancing the
    /// schedule or a concurrent toggle.
    async fn update(&self, schedule: &ReportSchedule, scope: UpdateScope)
        -> Result<(), StoreError>;

    /// Flip `is_active` atomically. Returns the updated schedule.
    async fn toggle_active(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ReportSchedule>, StoreError>;

    /// Delete a schedule and its run history. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Ids of active schedules with `next_run_at <= now` that are not under a
    /// live claim.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;

    /// Atomically claim the current due occurrence of a schedule.
    ///
    /// `now` is stamped as `claimed_at`, so callers pass the moment of the
    /// claim, not the start of a longer batch.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<ClaimOutcome, StoreError>;

    /// Record the result of a claimed run and release the claim.
    ///
    /// The run record is always stored (unless the schedule was deleted).
    /// `next_run_at`/`last_sent_at` are written only while the claim token is
    /// still held and the schedule's `next_run_at` still equals the claimed
    /// occurrence. Returns whether the schedule state was advanced.
    async fn record_outcome(&self, claim: &Claim, update: OutcomeUpdate)
        -> Result<bool, StoreError>;

    /// Store a run that did not go through a claim (test send, run now).
    async fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError>;

    /// Most recent runs first.
    async fn list_runs(&self, schedule_id: Uuid, limit: i64) -> Result<Vec<RunRecord>, StoreError>;

    /// Delete run records that finished before `cutoff`.
    async fn purge_runs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Contended columns an update is allowed to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateScope {
    pub reschedule: bool,
    pub set_active: bool,
}

#[derive(Debug, Clone)]
struct ClaimState {
    token: Uuid,
    occurrence: DateTime<Utc>,
    claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry {
    schedule: ReportSchedule,
    claim: Option<ClaimState>,
}

impl Entry {
    fn is_claimable(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        if !self.schedule.is_due(now) {
            return false;
        }
        match (&self.claim, self.schedule.next_run_at) {
            (Some(claim), Some(next)) => {
                claim.occurrence != next || claim.claimed_at <= now - lease
            }
            _ => true,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    schedules: HashMap<Uuid, Entry>,
    runs: Vec<RunRecord>,
}

/// Single-process store used for development and tests.
///
/// All operations run under one mutex, which makes `claim` trivially atomic.
#[derive(Debug)]
pub struct InMemoryScheduleStore {
    inner: Mutex<Inner>,
    lease: Duration,
}

impl Default for InMemoryScheduleStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_CLAIM_LEASE_SECS))
    }
}

impl InMemoryScheduleStore {
    pub fn new(lease: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            lease,
        }
    }
}

#[async_trait::async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn insert(&self, schedule: &ReportSchedule) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.schedules.contains_key(&schedule.id) {
            return Err(StoreError::Database(format!(
                "duplicate schedule id {}",
                schedule.id
            )));
        }
        inner.schedules.insert(
            schedule.id,
            Entry {
                schedule: schedule.clone(),
                claim: None,
            },
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReportSchedule>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.schedules.get(&id).map(|e| e.schedule.clone()))
    }

    async fn list(&self, filter: &ScheduleListFilter) -> Result<Vec<ReportSchedule>, StoreError> {
        let inner = self.inner.lock().await;
        let mut schedules: Vec<ReportSchedule> = inner
            .schedules
            .values()
            .map(|e| &e.schedule)
            .filter(|s| filter.active.map_or(true, |a| s.is_active == a))
            .filter(|s| filter.report_type.map_or(true, |t| s.report_type == t))
            .cloned()
            .collect();
        schedules.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(schedules)
    }

    async fn update(
        &self,
        schedule: &ReportSchedule,
        scope: UpdateScope,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .schedules
            .get_mut(&schedule.id)
            .ok_or(StoreError::NotFound(schedule.id))?;

        let preserved = (
            entry.schedule.next_run_at,
            entry.schedule.last_sent_at,
            entry.schedule.created_at,
            entry.schedule.created_by.clone(),
            entry.schedule.is_active,
        );
        entry.schedule = schedule.clone();
        if !scope.reschedule {
            entry.schedule.next_run_at = preserved.0;
        }
        if !scope.set_active {
            entry.schedule.is_active = preserved.4;
        }
        entry.schedule.last_sent_at = preserved.1;
        entry.schedule.created_at = preserved.2;
        entry.schedule.created_by = preserved.3;
        Ok(())
    }

    async fn toggle_active(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ReportSchedule>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.schedules.get_mut(&id).map(|entry| {
            entry.schedule.is_active = !entry.schedule.is_active;
            entry.schedule.updated_at = now;
            entry.schedule.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let existed = inner.schedules.remove(&id).is_some();
        if existed {
            inner.runs.retain(|r| r.schedule_id != id);
        }
        Ok(existed)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let inner = self.inner.lock().await;
        let mut due: Vec<(DateTime<Utc>, Uuid)> = inner
            .schedules
            .values()
            .filter(|e| e.is_claimable(now, self.lease))
            .filter_map(|e| e.schedule.next_run_at.map(|next| (next, e.schedule.id)))
            .collect();
        due.sort();
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.schedules.get_mut(&id) else {
            return Ok(ClaimOutcome::NotFound);
        };

        if !entry.is_claimable(now, self.lease) {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        let Some(occurrence) = entry.schedule.next_run_at else {
            return Ok(ClaimOutcome::AlreadyClaimed);
        };

        let state = ClaimState {
            token: Uuid::new_v4(),
            occurrence,
            claimed_at: now,
        };
        entry.claim = Some(state.clone());

        Ok(ClaimOutcome::Claimed(Box::new(Claim {
            schedule: entry.schedule.clone(),
            token: state.token,
            occurrence: state.occurrence,
            claimed_at: state.claimed_at,
        })))
    }

    async fn record_outcome(
        &self,
        claim: &Claim,
        update: OutcomeUpdate,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.schedules.get_mut(&claim.schedule.id) else {
            return Ok(false);
        };

        let holds_claim = entry
            .claim
            .as_ref()
            .is_some_and(|c| c.token == claim.token);
        let advanced = holds_claim && entry.schedule.next_run_at == Some(claim.occurrence);

        if advanced {
            entry.schedule.next_run_at = update.next_run_at;
            if let Some(sent) = update.last_sent_at {
                entry.schedule.last_sent_at = Some(sent);
            }
        }
        if holds_claim {
            entry.claim = None;
        }

        inner.runs.push(update.run);
        Ok(advanced)
    }

    async fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.schedules.contains_key(&run.schedule_id) {
            return Err(StoreError::NotFound(run.schedule_id));
        }
        inner.runs.push(run.clone());
        Ok(())
    }

    async fn list_runs(&self, schedule_id: Uuid, limit: i64) -> Result<Vec<RunRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut runs: Vec<RunRecord> = inner
            .runs
            .iter()
            .filter(|r| r.schedule_id == schedule_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn purge_runs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.runs.len();
        inner.runs.retain(|r| r.finished_at >= cutoff);
        Ok((before - inner.runs.len()) as u64)
    }
}
