//! In-process job table tracking maintenance work (spec §4.5, §9). Replaces
//! the source's package-level mutable state with an explicit, `RwLock`-
//! guarded value owned by whoever constructs [`crate::Maintenance`].

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Compaction,
    ExpirySweep,
    QuickIntegrityCheck,
    DeepIntegrityCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub id: Uuid,
    pub kind: JobKind,
    pub volume_id: Option<u32>,
    pub state: JobState,
    pub processed: u64,
    pub total: u64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub error: Option<String>,
}

/// `RwLock`-guarded table of job records, keyed by job id. Readers (CLI
/// polling, an admin endpoint) take the read lock; the maintenance task
/// driving a job holds the write lock only for the duration of each update.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, kind: JobKind, volume_id: Option<u32>, total: u64, now: i64) -> Uuid {
        let id = Uuid::new_v4();
        let status = JobStatus {
            id,
            kind,
            volume_id,
            state: JobState::Running,
            processed: 0,
            total,
            started_at: now,
            finished_at: None,
            error: None,
        };
        self.jobs.write().unwrap().insert(id, status);
        id
    }

    pub fn advance(&self, id: Uuid, processed: u64) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.processed = processed;
        }
    }

    pub fn finish(&self, id: Uuid, now: i64) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.state = JobState::Completed;
            job.finished_at = Some(now);
        }
    }

    pub fn fail(&self, id: Uuid, now: i64, error: String) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.state = JobState::Failed;
            job.finished_at = Some(now);
            job.error = Some(error);
        }
    }

    pub fn get(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs.read().unwrap().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<JobStatus> {
        let mut jobs: Vec<_> = self.jobs.read().unwrap().values().cloned().collect();
        jobs.sort_by_key(|job| job.started_at);
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_a_job_through_its_lifecycle() {
        let registry = JobRegistry::new();
        let id = registry.start(JobKind::Compaction, Some(1), 10, 100);
        registry.advance(id, 5);
        let status = registry.get(id).unwrap();
        assert_eq!(status.processed, 5);
        assert_eq!(status.state, JobState::Running);

        registry.finish(id, 200);
        let status = registry.get(id).unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.finished_at, Some(200));
    }

    #[test]
    fn failed_job_records_its_error() {
        let registry = JobRegistry::new();
        let id = registry.start(JobKind::DeepIntegrityCheck, None, 1000, 0);
        registry.fail(id, 1, "volume missing on disk".to_string());
        let status = registry.get(id).unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error.as_deref(), Some("volume missing on disk"));
    }

    #[test]
    fn list_is_ordered_by_start_time() {
        let registry = JobRegistry::new();
        let later = registry.start(JobKind::ExpirySweep, None, 0, 50);
        let earlier = registry.start(JobKind::ExpirySweep, None, 0, 10);
        let ids: Vec<_> = registry.list().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![earlier, later]);
    }
}
