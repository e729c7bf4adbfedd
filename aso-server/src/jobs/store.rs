//! In-memory job store.
//!
//! Single source of truth for job records. Every mutation is a per-key
//! atomic read-modify-write through the map's entry lock, so interleaved
//! writers (competing sub-tasks, competing pollers) cannot lose updates.
//! Deadline and retention transitions are pure functions of "now vs. stored
//! timestamp", applied lazily at read time.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::model::{AnalyzeRequest, JobRecord, JobState, JobView, PRIMARY_FETCH_PROGRESS};
use crate::{Error, Result};

pub struct JobStore {
    jobs: DashMap<String, JobRecord>,
    retention: chrono::Duration,
}

impl JobStore {
    /// Create a store whose terminal jobs expire `retention` after their
    /// last update, measured at read time.
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
        }
    }

    /// Create a new PENDING job.
    pub fn create(&self, request: AnalyzeRequest, deadline: Duration) -> JobRecord {
        let record = JobRecord::new(
            request,
            chrono::Duration::from_std(deadline).unwrap_or_else(|_| chrono::Duration::minutes(5)),
        );
        info!(job_id = %record.id, package = %record.request.package_name, "job created");
        self.jobs.insert(record.id.clone(), record.clone());
        record
    }

    /// Create a job that is COMPLETED from the start, used when a cached
    /// analysis short-circuits the pipeline (PENDING -> COMPLETED directly).
    pub fn create_completed(&self, request: AnalyzeRequest, data: Value) -> JobRecord {
        let mut record = JobRecord::new(request, chrono::Duration::zero());
        record.state = JobState::Completed;
        record.progress = 100;
        if let Value::Object(map) = data {
            record.data = map;
        }
        debug!(job_id = %record.id, "job completed from cache");
        self.jobs.insert(record.id.clone(), record.clone());
        record
    }

    /// Transition PENDING -> PROCESSING. Fails for any other current state,
    /// which is what guarantees exactly one orchestration run per job id.
    pub fn begin_processing(&self, id: &str) -> Result<()> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Job", id))?;

        if entry.state != JobState::Pending {
            return Err(Error::InvalidStateTransition {
                from: entry.state.as_str().to_string(),
                to: JobState::Processing.as_str().to_string(),
            });
        }
        entry.state = JobState::Processing;
        entry.progress = entry.progress.max(10);
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// Record the mandatory primary fetch result and pin progress at 40.
    pub fn record_primary(&self, id: &str, key: &str, value: Value) {
        self.record_subtask(id, key, value, PRIMARY_FETCH_PROGRESS);
    }

    /// Record one sub-task's result-or-error and raise progress.
    ///
    /// Progress is clamped monotonic: a slow writer reporting a stale value
    /// can never move the number backwards. Writes against a terminal job
    /// are dropped (the job may have lazily timed out under a poller).
    pub fn record_subtask(&self, id: &str, key: &str, value: Value, progress: u8) {
        let Some(mut entry) = self.jobs.get_mut(id) else {
            return;
        };
        if entry.state.is_terminal() {
            debug!(job_id = %id, key, "dropping sub-task result for terminal job");
            return;
        }
        entry.data.insert(key.to_string(), value);
        entry.progress = entry.progress.max(progress.min(100));
        entry.updated_at = Utc::now();
    }

    /// Transition PROCESSING -> COMPLETED. No-op on terminal jobs.
    pub fn complete(&self, id: &str) {
        self.finish(id, JobState::Completed, None);
    }

    /// Transition to ERROR with a client-visible message. No-op on terminal jobs.
    pub fn fail(&self, id: &str, message: impl Into<String>) {
        self.finish(id, JobState::Error, Some(message.into()));
    }

    fn finish(&self, id: &str, state: JobState, error: Option<String>) {
        let Some(mut entry) = self.jobs.get_mut(id) else {
            return;
        };
        if entry.state.is_terminal() {
            debug!(job_id = %id, current = %entry.state, "ignoring finish on terminal job");
            return;
        }
        entry.state = state;
        entry.error = error;
        if state == JobState::Completed {
            entry.progress = 100;
        }
        entry.updated_at = Utc::now();
        info!(job_id = %id, state = %state, "job finished");
    }

    /// Read a job, applying lazy transitions first: a PROCESSING job past
    /// its deadline becomes TIMEOUT; a terminal job past the retention
    /// window is deleted and reported as not found.
    pub fn get(&self, id: &str) -> Option<JobView> {
        let now = Utc::now();
        let mut expired = false;

        let view = {
            let mut entry = self.jobs.get_mut(id)?;

            if entry.state == JobState::Processing && now >= entry.deadline_at {
                entry.state = JobState::Timeout;
                entry.error = Some("job exceeded its processing deadline".to_string());
                entry.updated_at = now;
                info!(job_id = %id, "job lazily timed out");
            }

            if entry.state.is_terminal() && now - entry.updated_at >= self.retention {
                expired = true;
                None
            } else {
                Some(JobView::from(&*entry))
            }
        };

        if expired {
            self.jobs.remove(id);
            debug!(job_id = %id, "expired job deleted on read");
        }
        view
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> AnalyzeRequest {
        AnalyzeRequest {
            package_name: "com.example.app".to_string(),
            competitor_package_names: vec![],
            keywords: vec![],
        }
    }

    fn store() -> JobStore {
        JobStore::new(Duration::from_secs(3600))
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        let record = store.create(request(), Duration::from_secs(300));

        let view = store.get(&record.id).unwrap();
        assert_eq!(view.status, JobState::Pending);
        assert_eq!(view.progress, 0);
        assert!(view.data.is_none());
    }

    #[test]
    fn begin_processing_is_single_shot() {
        let store = store();
        let record = store.create(request(), Duration::from_secs(300));

        store.begin_processing(&record.id).unwrap();
        // A competing second run for the same id must be rejected.
        assert!(store.begin_processing(&record.id).is_err());
    }

    #[test]
    fn progress_is_monotonic() {
        let store = store();
        let record = store.create(request(), Duration::from_secs(300));
        store.begin_processing(&record.id).unwrap();

        store.record_subtask(&record.id, "market_trends", json!({}), 70);
        store.record_subtask(&record.id, "keyword_suggestions", json!({}), 55);

        let view = store.get(&record.id).unwrap();
        assert_eq!(view.progress, 70);
    }

    #[test]
    fn terminal_state_is_never_overwritten() {
        let store = store();
        let record = store.create(request(), Duration::from_secs(300));
        store.begin_processing(&record.id).unwrap();
        store.complete(&record.id);

        store.fail(&record.id, "late failure");
        store.record_subtask(&record.id, "late", json!({}), 5);

        let view = store.get(&record.id).unwrap();
        assert_eq!(view.status, JobState::Completed);
        assert_eq!(view.progress, 100);
        assert!(view.error.is_none());
    }

    #[test]
    fn processing_past_deadline_times_out_on_read() {
        let store = store();
        let record = store.create(request(), Duration::ZERO);
        store.begin_processing(&record.id).unwrap();

        let view = store.get(&record.id).unwrap();
        assert_eq!(view.status, JobState::Timeout);
        assert!(view.error.is_some());
    }

    #[test]
    fn completed_job_expires_after_retention() {
        let store = JobStore::new(Duration::ZERO);
        let record = store.create(request(), Duration::from_secs(300));
        store.begin_processing(&record.id).unwrap();
        store.complete(&record.id);

        assert!(store.get(&record.id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn cache_hit_job_is_born_completed() {
        let store = store();
        let record = store.create_completed(request(), json!({"app_analysis": {"score": 1}}));

        let view = store.get(&record.id).unwrap();
        assert_eq!(view.status, JobState::Completed);
        assert_eq!(view.progress, 100);
        assert!(view.data.unwrap().get("app_analysis").is_some());
    }

    #[test]
    fn unknown_id_is_not_found() {
        assert!(store().get("missing").is_none());
    }
}
